//! CLI command implementations.
//!
//! | Module      | Commands handled |
//! |-------------|------------------|
//! | `move_card` | `Move`           |
//! | `simulate`  | `Simulate`       |
//! | `config`    | `Config`         |

pub mod config;
pub mod move_card;
pub mod render;
pub mod simulate;

pub use config::cmd_config;
pub use move_card::cmd_move;
pub use simulate::cmd_simulate;
