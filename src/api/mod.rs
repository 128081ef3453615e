//! API endpoint modules.

pub mod health;
pub mod imports;
pub mod openapi;
pub mod uploads;

use actix_web::web;

use crate::services::ImportServices;

pub use health::configure_health_routes;
pub use imports::configure_routes as configure_import_routes;
pub use openapi::ApiDoc;
pub use uploads::configure_routes as configure_upload_routes;

/// Register shared state and every `/api/v1` route.
pub fn configure_api(services: ImportServices) -> impl FnOnce(&mut web::ServiceConfig) {
    move |cfg| {
        let max_upload_size = services.settings.max_upload_size;
        cfg.app_data(web::Data::new(services))
            .app_data(web::JsonConfig::default().limit(64 * 1024))
            .app_data(web::PayloadConfig::new(max_upload_size * 2))
            .service(
                web::scope("/api/v1")
                    .configure(configure_health_routes)
                    .configure(configure_import_routes)
                    .configure(configure_upload_routes),
            );
    }
}
