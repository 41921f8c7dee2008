pub mod cookies;
pub mod extract;
pub mod form;
pub mod http;
pub mod session;

use crate::config::PortalConfig;

pub const DEFAULT_LOGIN_PATH: &str = "/PXP2_Login_Student.aspx?regenerateSessionId=True";
pub const DEFAULT_GRADEBOOK_PATH: &str = "/PXP2_Gradebook.aspx?AGU=0";
pub const DEFAULT_HOME_MARKER: &str = "Home_PXP2.aspx";
pub const DEFAULT_LOGIN_MARKER: &str = "PXP2_Login";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalUrls {
    pub login: String,
    pub gradebook: String,
    /// Substring of the post-login destination that marks a successful login.
    pub home_marker: String,
    /// Substring of a redirect target that means the session is gone.
    pub login_marker: String,
}

impl PortalUrls {
    pub fn from_base(base_url: &str) -> Self {
        Self::new(base_url, DEFAULT_LOGIN_PATH, DEFAULT_GRADEBOOK_PATH)
    }

    pub fn new(base_url: &str, login_path: &str, gradebook_path: &str) -> Self {
        Self {
            login: join_url(base_url, login_path),
            gradebook: join_url(base_url, gradebook_path),
            home_marker: DEFAULT_HOME_MARKER.to_string(),
            login_marker: DEFAULT_LOGIN_MARKER.to_string(),
        }
    }
}

impl From<&PortalConfig> for PortalUrls {
    fn from(value: &PortalConfig) -> Self {
        Self::new(&value.base_url, &value.login_path, &value.gradebook_path)
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
