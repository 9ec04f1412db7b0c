use uuid::Uuid;

/// Who is calling. Requests without a bearer token act as `Guest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identity {
    Guest,
    User { key: Uuid },
}

impl Identity {
    pub fn user_key(&self) -> Option<Uuid> {
        match self {
            Identity::Guest => None,
            Identity::User { key } => Some(*key),
        }
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Identity::Guest => f.write_str("guest"),
            Identity::User { key } => write!(f, "user:{}", key),
        }
    }
}
