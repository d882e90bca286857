use actix_web::dev::Server;
use actix_web::{web, App, HttpServer};
use sqlx::PgPool;
use std::net::TcpListener;

use crate::configuration::JwtSettings;
use crate::middleware::{JwtMiddleware, RequestLogger};
use crate::routes::{get_current_user, health_check, login, logout, refresh, register};

pub fn run(
    listener: TcpListener,
    connection: PgPool,
    jwt_config: JwtSettings,
) -> Result<Server, std::io::Error> {
    let connection = web::Data::new(connection);
    let jwt_config_data = web::Data::new(jwt_config.clone());

    let server = HttpServer::new(move || {
        App::new()
            .wrap(RequestLogger)
            .app_data(connection.clone())
            .app_data(jwt_config_data.clone())
            // Public routes
            .route("/health_check", web::get().to(health_check))
            .route("/auth/register", web::post().to(register))
            .route("/auth/login", web::post().to(login))
            .route("/auth/refresh", web::post().to(refresh))
            // Logout is nominally public: revoke_all does its own bearer check.
            .route("/auth/logout", web::post().to(logout))
            // Protected routes (require a valid bearer access token)
            .service(
                web::scope("/auth/me")
                    .wrap(JwtMiddleware::new(jwt_config.clone()))
                    .route("", web::get().to(get_current_user)),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
