use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declares a UUID-backed identifier newtype.
///
/// Each document type gets its own id so an `InvoiceId` can never be passed
/// where an `OrderId` is expected.
macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random id.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an id from an existing UUID.
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

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
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
    };
}

uuid_id!(
    /// Identifier of an order document.
    OrderId
);
uuid_id!(
    /// Identifier of an invoice document.
    InvoiceId
);
uuid_id!(
    /// Identifier of a payment transaction record.
    TransactionId
);
uuid_id!(
    /// Identifier of a user account (owned by the excluded auth service).
    UserId
);
uuid_id!(
    /// Identifier of an uploaded design version.
    DesignId
);
uuid_id!(
    /// Identifier of a shipping record.
    ShippingId
);
uuid_id!(
    /// Identifier of a brief or feedback entry.
    BriefId
);

/// Role of the authenticated caller.
///
/// Every permission check in the workspace matches on this enum exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Customer,
    Admin,
    SuperAdmin,
}

impl UserRole {
    /// Returns true for roles allowed to run back-office mutations.
    pub fn is_admin(&self) -> bool {
        match self {
            UserRole::Customer => false,
            UserRole::Admin | UserRole::SuperAdmin => true,
        }
    }

    /// Returns true only for the super-admin role.
    pub fn is_super_admin(&self) -> bool {
        match self {
            UserRole::Customer | UserRole::Admin => false,
            UserRole::SuperAdmin => true,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Customer => "customer",
            UserRole::Admin => "admin",
            UserRole::SuperAdmin => "super_admin",
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Returned when a role string does not name a known role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRole(pub String);

impl std::fmt::Display for UnknownRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown role: {}", self.0)
    }
}

impl std::error::Error for UnknownRole {}

impl std::str::FromStr for UserRole {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "customer" | "user" => Ok(UserRole::Customer),
            "admin" => Ok(UserRole::Admin),
            "super_admin" | "superadmin" | "super-admin" => Ok(UserRole::SuperAdmin),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// The authenticated caller of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub role: UserRole,
}

impl Actor {
    pub fn new(user_id: UserId, role: UserRole) -> Self {
        Self { user_id, role }
    }

    pub fn customer(user_id: UserId) -> Self {
        Self::new(user_id, UserRole::Customer)
    }

    pub fn admin(user_id: UserId) -> Self {
        Self::new(user_id, UserRole::Admin)
    }

    pub fn super_admin(user_id: UserId) -> Self {
        Self::new(user_id, UserRole::SuperAdmin)
    }

    /// Returns true if the actor owns the resource or is an admin.
    pub fn can_access(&self, owner: UserId) -> bool {
        match self.role {
            UserRole::Customer => self.user_id == owner,
            UserRole::Admin | UserRole::SuperAdmin => true,
        }
    }
}

/// Stable, machine-readable error classification shared by every crate.
///
/// Clients branch on this value; the accompanying message is display text only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    InvalidTransition,
    InvalidOrderState,
    PaymentRequired,
    AmountMismatch,
    AlreadyProcessed,
    Unauthorized,
    ValidationError,
    GatewayUnavailable,
    Conflict,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "NotFound",
            ErrorKind::AlreadyExists => "AlreadyExists",
            ErrorKind::InvalidTransition => "InvalidTransition",
            ErrorKind::InvalidOrderState => "InvalidOrderState",
            ErrorKind::PaymentRequired => "PaymentRequired",
            ErrorKind::AmountMismatch => "AmountMismatch",
            ErrorKind::AlreadyProcessed => "AlreadyProcessed",
            ErrorKind::Unauthorized => "Unauthorized",
            ErrorKind::ValidationError => "ValidationError",
            ErrorKind::GatewayUnavailable => "GatewayUnavailable",
            ErrorKind::Conflict => "Conflict",
            ErrorKind::Internal => "Internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
