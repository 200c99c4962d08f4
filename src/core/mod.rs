// Domain-layer modules and shared errors/models
pub mod nested_form {
    pub use crate::nested_form::*;
}

pub mod audio_format {
    pub use crate::audio_format::*;
}

pub mod attachments {
    pub use crate::attachments::*;
}

pub mod message {
    pub use crate::message::*;
}

pub mod field_updater {
    pub use crate::field_updater::*;
}

pub mod models {
    pub use crate::models::*;
}

pub mod errors {
    pub use crate::errors::*;
}
