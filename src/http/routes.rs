use axum::Router;

use crate::app::AppContext;

/// A group of related routes.
///
/// Every area of the API (companies, contracts, billing, ...) implements
/// this and is merged into the application router by [`App`](crate::App).
///
/// ```ignore
/// struct NotesModule;
///
/// impl RouteModule for NotesModule {
///     fn routes(&self) -> Router<AppContext> {
///         Router::new().route("/api/notes", get(list_notes).post(create_note))
///     }
/// }
/// ```
pub trait RouteModule {
    /// Routes without state applied. Handlers take `State<AppContext>`.
    fn routes(&self) -> Router<AppContext>
    where
        Self: Sized;

    /// Optional path prefix for every route in this module.
    fn prefix(&self) -> Option<&str> {
        None
    }

    fn register(self, router: Router<AppContext>) -> Router<AppContext>
    where
        Self: Sized,
    {
        let routes = self.routes();

        if let Some(prefix) = self.prefix() {
            router.nest(prefix, routes)
        } else {
            router.merge(routes)
        }
    }
}
