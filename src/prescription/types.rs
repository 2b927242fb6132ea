use serde::{Deserialize, Serialize};

/// A demo account. Passwords are plain text; the data is static demo content.
#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub username: String,
    pub password: String,
    pub fullname: String,
}

/// One prescribed medicine, as stored in the bundled prescription file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Medicine {
    pub name: String,
    /// `morning+afternoon+evening`, e.g. "1+0+1".
    pub dosage_pattern: String,
    pub days: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prescription {
    pub username: String,
    pub medicines: Vec<Medicine>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UserFile {
    pub users: Vec<User>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PrescriptionFile {
    pub prescriptions: Vec<Prescription>,
}
