mod health;
mod maintenance;
mod metrics;
mod services;

macros_utils::routes! {
    mod health,
    mod services,
    mod metrics,
    mod maintenance,
}
