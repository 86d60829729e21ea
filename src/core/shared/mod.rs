pub mod error;
pub mod schema;
pub mod state;
#[cfg(all(test, feature = "intake"))]
pub mod test_utils;
pub mod utils;

pub use error::{ApiError, ApiResult};
pub use state::AppState;
pub use utils::{create_conn, DbConn, DbPool};
