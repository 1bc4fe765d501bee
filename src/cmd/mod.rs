//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module          | Commands handled                                   |
//! |-----------------|-----------------------------------------------------|
//! | `session`       | `Login`, `Register`, `Logout`, `Whoami`            |
//! | `board`         | `Boards`, `Board`, `Column`, `Task`                |
//! | `notifications` | `Notifications`                                    |
//! | `sync`          | `Sync`, `Watch`                                    |
//! | `config`        | `Config`                                           |

pub mod board;
pub mod config;
pub mod notifications;
pub mod session;
pub mod sync;

pub use board::{cmd_board, cmd_boards, cmd_column, cmd_task};
pub use config::cmd_config;
pub use notifications::cmd_notifications;
pub use session::{cmd_login, cmd_logout, cmd_register, cmd_whoami};
pub use sync::{cmd_sync, cmd_watch};

use anyhow::Result;
use boardsync::client::BoardSync;
use boardsync::store::{Identity, Resolution};

/// The signed-in identity, or an error telling the user to sign in.
pub(crate) fn require_user(client: &BoardSync) -> Result<Identity> {
    client
        .session
        .current_user()
        .ok_or_else(|| anyhow::anyhow!("Not signed in. Run 'boardsync login' first."))
}

/// Prints where a mutation ended up.
pub(crate) fn report<T>(action: &str, resolution: &Resolution<T>) {
    match resolution {
        Resolution::Remote(_) => println!("{} {}", console::style("✓").green(), action),
        Resolution::Local => println!(
            "{} {} {}",
            console::style("✓").yellow(),
            action,
            console::style("(saved locally, remote unreachable)").dim()
        ),
    }
}
