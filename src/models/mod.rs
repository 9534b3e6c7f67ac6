mod activation;
mod api_key;
mod brand;
mod license;
mod license_event;
mod license_key;

pub use activation::*;
pub use api_key::*;
pub use brand::*;
pub use license::*;
pub use license_event::*;
pub use license_key::*;
