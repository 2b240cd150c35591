//! OpenAPI documentation

use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{books, health, loans, users};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Biblio API",
        version = "0.4.0",
        description = "Library catalog and loan ledger REST API",
        license(name = "AGPL-3.0", url = "https://www.gnu.org/licenses/agpl-3.0.html")
    ),
    servers(
        (url = "/api", description = "API")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Auth
        users::login,
        users::register,
        users::change_password,
        // Users
        users::list_users,
        users::update_user,
        users::block_user,
        // Books
        books::list_books,
        books::get_book,
        books::create_book,
        books::update_book,
        books::delete_book,
        // Loans
        loans::current_loan,
        loans::borrow_book,
        loans::return_book,
        loans::full_history,
        loans::user_loans,
        loans::user_history,
    ),
    components(
        schemas(
            // Books
            crate::models::book::Book,
            crate::models::book::BookPatch,
            books::BookActionResponse,
            // Loans
            crate::models::ledger::LoanStatus,
            crate::models::ledger::EntryKind,
            crate::models::ledger::LoanEventResponse,
            crate::models::ledger::LoanDetails,
            loans::LoanRequest,
            loans::UserLoansResponse,
            // Users
            crate::models::user::Role,
            crate::models::user::User,
            crate::models::user::LoginRequest,
            crate::models::user::RegisterRequest,
            crate::models::user::ChangePasswordRequest,
            crate::models::user::UpdateUser,
            crate::models::user::BlockRequest,
            users::LoginResponse,
            users::UserResponse,
            // Common
            crate::api::MessageResponse,
            health::HealthResponse,
            crate::error::ErrorResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "auth", description = "Login, registration and passwords"),
        (name = "users", description = "User administration"),
        (name = "books", description = "Catalog management"),
        (name = "loans", description = "Loans and history")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
