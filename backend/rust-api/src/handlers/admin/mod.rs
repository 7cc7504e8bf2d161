mod cache;
mod invitations;
mod users;

pub use cache::*;
pub use invitations::*;
pub use users::*;
