pub mod analyze_profiles;
pub mod fetch_followings;
pub mod login_check;
pub mod send_messages;

pub use analyze_profiles::AnalyzeProfiles;
pub use fetch_followings::FetchFollowings;
pub use login_check::LoginCheck;
pub use send_messages::SendMessages;

use std::sync::Arc;

use crate::kernel::jobs::{BrowserPort, TaskDispatcher};

use super::text_composer::TextComposer;

/// Registers one use-case per task kind, the Rust rendering of spec.md
/// §9's "registry of exception-to-HTTP mappings becomes an ordered table
/// lookup" pattern applied to task kind -> use-case.
pub fn register_all(
    dispatcher: &mut TaskDispatcher,
    browser: Arc<dyn BrowserPort>,
    composer: Arc<dyn TextComposer>,
) {
    dispatcher.register(
        "analyze_profiles",
        Arc::new(AnalyzeProfiles::new(browser.clone())),
    );
    dispatcher.register(
        "send_messages",
        Arc::new(SendMessages::new(browser.clone(), composer)),
    );
    dispatcher.register(
        "fetch_followings",
        Arc::new(FetchFollowings::new(browser.clone())),
    );
    dispatcher.register("login_check", Arc::new(LoginCheck::new(browser)));
}
