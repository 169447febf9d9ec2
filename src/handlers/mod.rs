pub mod health;
pub mod reports;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;
