//! Self update from the published releases.
//!
//! **Example** - Checking for and applying an update:
//! ```ignore
//! let updater = Updater::new(&settings, tmp_dir, Arc::new(HttpFeed::new()?), status);
//! updater.clean_old_versions();
//! if let Some(version) = updater.check_for_update() {
//!     updater.update(&version, || println!("restarting"))?;
//! }
//! ```

mod feed;
mod installer;

pub use feed::{parse_releases, Asset, HttpFeed, Release, ReleaseFeed};
pub use installer::{asset_name, backup_path, is_newer, Updater};
