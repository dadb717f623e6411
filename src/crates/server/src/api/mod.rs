pub mod commands;
pub mod dto;
pub mod error;
pub mod events;

use crate::consts;
use crate::middleware::token::verify_api_token;
use actix_web::{middleware::from_fn, web};

pub fn configure_service(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope(consts::URL_PATH_API)
            .wrap(from_fn(verify_api_token))
            .service(commands::active_chats)
            .service(commands::ping)
            .service(commands::play)
            .service(commands::next)
            .service(commands::stop)
            .service(commands::force_stop)
            .service(commands::reboot)
            .service(commands::skip)
            .service(commands::seek)
            .service(commands::speed)
            .service(commands::set_loop)
            .service(commands::pause)
            .service(commands::resume)
            .service(commands::mute)
            .service(commands::unmute)
            .service(commands::auto_end)
            .service(commands::queue)
            .service(commands::participants)
            .service(events::ingest),
    );
}

#[cfg(test)]
mod tests;
