use common::utils::config::AppConfig;

/// Owner recorded on uploads when no user is known.
pub const ANONYMOUS_USER: &str = "anonymous";

/// Identity collaborator. Authentication itself happens elsewhere.
pub trait Session: Send + Sync {
    fn is_logged_in(&self) -> bool;
    fn current_user(&self) -> Option<String>;
}

/// A session fixed at construction, e.g. from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticSession {
    user_id: Option<String>,
}

impl StaticSession {
    pub fn new(user_id: Option<String>) -> Self {
        Self {
            user_id: user_id.filter(|id| !id.trim().is_empty()),
        }
    }

    pub fn logged_in(user_id: impl Into<String>) -> Self {
        Self::new(Some(user_id.into()))
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.user_id.clone())
    }
}

impl Session for StaticSession {
    fn is_logged_in(&self) -> bool {
        self.user_id.is_some()
    }

    fn current_user(&self) -> Option<String> {
        self.user_id.clone()
    }
}
