pub mod search_cache;
pub mod search_requests;
pub mod user_windows;

pub mod prelude {
    pub use super::search_cache::Entity as SearchCache;
    pub use super::search_requests::Entity as SearchRequests;
    pub use super::user_windows::Entity as UserWindows;
}
