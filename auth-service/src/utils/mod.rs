pub mod backup_codes;
pub mod password;
pub mod validation;

pub use backup_codes::{hash_backup_code, BackupCodeBatch};
pub use password::{
    hash_password, verify_password, verify_password_async, Password, PasswordHashString,
};
pub use validation::{OptionalJson, ValidatedJson};
