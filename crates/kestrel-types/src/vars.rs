use serde::{Deserialize, Serialize};

/// Identifying variables supplied by a request.
///
/// `device` selects the storage device; the remaining fields name the object.
/// When `hash` is set it is used as the identity directly instead of being
/// derived from account/container/object.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectVars {
    pub device: String,
    pub account: Option<String>,
    pub container: Option<String>,
    pub object: Option<String>,
    pub hash: Option<String>,
}

impl ObjectVars {
    /// Variables naming a fully qualified object on a device.
    pub fn new(
        device: impl Into<String>,
        account: impl Into<String>,
        container: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        Self {
            device: device.into(),
            account: Some(account.into()),
            container: Some(container.into()),
            object: Some(object.into()),
            hash: None,
        }
    }

    /// Variables addressing an object by a precomputed hash.
    pub fn with_hash(device: impl Into<String>, hash: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            hash: Some(hash.into()),
            ..Default::default()
        }
    }
}
