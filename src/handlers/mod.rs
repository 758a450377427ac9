//! API handlers for the UniGoods backend

mod health;
mod items;
mod trades;
mod users;
mod verification;

pub use health::{health_check, root, HealthResponse};
pub use items::*;
pub use trades::*;
pub use users::get_user;
pub use verification::*;
