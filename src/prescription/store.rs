use tracing::{debug, warn};

use super::error::PrescriptionError;
use super::types::{Prescription, PrescriptionFile, User, UserFile};

const USERS_JSON: &str = include_str!("../../assets/users.json");
const PRESCRIPTIONS_JSON: &str = include_str!("../../assets/prescriptions.json");

/// Read-only view over the demo users and prescriptions.
#[derive(Debug, Clone)]
pub struct PrescriptionStore {
    users: Vec<User>,
    prescriptions: Vec<Prescription>,
}

impl PrescriptionStore {
    /// Load the data compiled into the binary.
    pub fn bundled() -> Result<Self, PrescriptionError> {
        Self::from_json(USERS_JSON, PRESCRIPTIONS_JSON)
    }

    pub fn from_json(users_json: &str, prescriptions_json: &str) -> Result<Self, PrescriptionError> {
        let users: UserFile =
            serde_json::from_str(users_json).map_err(|e| PrescriptionError::Data {
                file: "users.json",
                message: e.to_string(),
            })?;
        let prescriptions: PrescriptionFile =
            serde_json::from_str(prescriptions_json).map_err(|e| PrescriptionError::Data {
                file: "prescriptions.json",
                message: e.to_string(),
            })?;

        Ok(Self {
            users: users.users,
            prescriptions: prescriptions.prescriptions,
        })
    }

    /// Check a username/password pair against the demo accounts.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<&User, PrescriptionError> {
        match self
            .users
            .iter()
            .find(|u| u.username == username && u.password == password)
        {
            Some(user) => {
                debug!(username, "demo login succeeded");
                Ok(user)
            }
            None => {
                warn!(username, "demo login rejected");
                Err(PrescriptionError::InvalidCredentials)
            }
        }
    }

    /// The prescription for `username`, if one exists.
    pub fn prescription_for(&self, username: &str) -> Option<&Prescription> {
        self.prescriptions.iter().find(|p| p.username == username)
    }

    /// Usernames of all demo accounts, in file order.
    pub fn usernames(&self) -> Vec<&str> {
        self.users.iter().map(|u| u.username.as_str()).collect()
    }
}
