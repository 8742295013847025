use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declares a UUID-backed identifier newtype.
///
/// Each entity gets its own type so an order id can never be passed where a
/// variant id is expected.
macro_rules! typed_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an identifier from an existing UUID.
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the underlying UUID.
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

typed_id!(
    /// Identifier of a buyer organization.
    OrganizationId
);
typed_id!(
    /// Identifier of a supplier factory.
    FactoryId
);
typed_id!(
    /// Identifier of a catalog product.
    ProductId
);
typed_id!(
    /// Identifier of a purchasable product variant.
    VariantId
);
typed_id!(
    /// Identifier of a price list.
    PriceListId
);
typed_id!(PriceId);
typed_id!(
    /// Identifier of a platform user.
    UserId
);
typed_id!(
    /// Identifier of an order.
    OrderId
);
typed_id!(OrderItemId);
typed_id!(
    /// Identifier of a delivery job (the tracked "render and send" unit of work).
    DeliveryJobId
);
typed_id!(AuditEntryId);

impl UserId {
    /// The actor recorded for actions taken by the platform itself rather
    /// than on behalf of a user.
    pub fn system() -> Self {
        Self(Uuid::nil())
    }

    /// Returns true for the platform's own actor id.
    pub fn is_system(&self) -> bool {
        self.0.is_nil()
    }
}

/// Storage location of a rendered order document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentRef(String);

impl DocumentRef {
    pub fn new(location: impl Into<String>) -> Self {
        Self(location.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for DocumentRef {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<DocumentRef> for String {
    fn from(doc: DocumentRef) -> Self {
        doc.0
    }
}
