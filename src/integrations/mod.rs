//! External service integrations.

pub mod kommo_client {
    pub use crate::kommo_client::*;
}

pub mod openai_client {
    pub use crate::openai_client::*;
}

pub mod media_fetcher {
    pub use crate::media_fetcher::*;
}

pub mod webhook_models {
    pub use crate::webhook_models::*;
}
