//! Small declarative helpers shared by the HTTP apps.

/// Build a `pub fn routes(cfg: &mut ServiceConfig)` from a list of entries.
///
/// `route handler,` registers an attribute-routed actix handler and
/// `mod module,` delegates to `module::routes`.
///
/// ```ignore
/// macros_utils::routes! {
///     route health_route,
///     mod metrics,
/// }
/// ```
#[cfg(feature = "actix")]
#[macro_export]
macro_rules! routes {
    ($($body:tt)*) => {
        pub fn routes(cfg: &mut ::actix_web::web::ServiceConfig) {
            $crate::__routes_entries!(cfg; $($body)*);
        }
    };
}

#[cfg(feature = "actix")]
#[doc(hidden)]
#[macro_export]
macro_rules! __routes_entries {
    ($cfg:ident;) => {};
    ($cfg:ident; route $route:ident $(, $($rest:tt)*)?) => {
        $cfg.service($route);
        $crate::__routes_entries!($cfg; $($($rest)*)?);
    };
    ($cfg:ident; mod $module:ident $(, $($rest:tt)*)?) => {
        $cfg.configure($module::routes);
        $crate::__routes_entries!($cfg; $($($rest)*)?);
    };
}
