use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Borrow the raw identifier
            #[inline]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Value object: tenant ID
    TenantId
);
string_id!(
    /// Value object: workflow definition ID
    WorkflowId
);
string_id!(
    /// Value object: workflow execution ID
    ExecutionId
);
string_id!(
    /// Value object: provider message ID, unique per delivery attempt
    ExternalMessageId
);
string_id!(
    /// Value object: sender (phone number / provider user ID)
    SenderId
);
string_id!(
    /// Value object: outbound send batch ID
    BatchId
);
string_id!(
    /// Value object: form instance ID
    FormInstanceId
);

impl ExecutionId {
    /// Generate a fresh execution ID
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_display_and_conversions() {
        let id: ExecutionId = "exec-1".into();
        assert_eq!(id.to_string(), "exec-1");
        assert_eq!(id.as_str(), "exec-1");

        let sender = SenderId::from("5511999990000".to_string());
        assert_eq!(sender.0, "5511999990000");
    }

    #[test]
    fn test_ids_serialize_transparently() {
        let id = TenantId("acme".to_string());
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"acme\"");

        let back: TenantId = serde_json::from_str("\"acme\"").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_generated_execution_ids_are_unique() {
        assert_ne!(ExecutionId::generate(), ExecutionId::generate());
    }
}
