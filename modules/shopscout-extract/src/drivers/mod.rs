mod browserless;
mod replay;

pub use browserless::{BrowserlessDriver, RemoteBrowser};
pub use replay::{ReplayDriver, ReplayFile, ReplayResponse};
