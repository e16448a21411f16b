use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};

use crate::domain::approval::{ApprovalRecord, ApproverRole};
use crate::domain::leave::{EmployeeId, LeaveRequestId};

type HmacSha256 = Hmac<Sha256>;

/// Signs approval records so a generated document can later be checked
/// against the decision it claims to carry.
#[derive(Clone, Debug)]
pub struct ApprovalSigner {
    signing_key: SecretString,
}

impl ApprovalSigner {
    pub fn new(signing_key: SecretString) -> Self {
        Self { signing_key }
    }

    pub fn sign(
        &self,
        leave_request_id: &LeaveRequestId,
        level: u8,
        approver_id: &EmployeeId,
        approver_role: ApproverRole,
        decided_at: DateTime<Utc>,
    ) -> String {
        let material =
            signing_material(leave_request_id, level, approver_id, approver_role, decided_at);
        hmac_hex(self.signing_key.expose_secret().as_bytes(), material.as_bytes())
    }

    pub fn verify(&self, record: &ApprovalRecord) -> bool {
        let expected = self.sign(
            &record.leave_request_id,
            record.level,
            &record.approver_id,
            record.approver_role,
            record.decided_at,
        );
        constant_time_eq(expected.as_bytes(), record.signature.as_bytes())
    }
}

fn signing_material(
    leave_request_id: &LeaveRequestId,
    level: u8,
    approver_id: &EmployeeId,
    approver_role: ApproverRole,
    decided_at: DateTime<Utc>,
) -> String {
    format!(
        "{}|{}|{}|{}|{}",
        leave_request_id.0,
        level,
        approver_id.0,
        approver_role.as_str(),
        decided_at.to_rfc3339(),
    )
}

fn hmac_hex(secret: &[u8], payload: &[u8]) -> String {
    let mut mac = match HmacSha256::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => return sha256_hex(payload),
    };
    mac.update(payload);
    encode_hex(mac.finalize().into_bytes().as_slice())
}

fn sha256_hex(payload: &[u8]) -> String {
    encode_hex(Sha256::digest(payload).as_slice())
}

fn encode_hex(bytes: &[u8]) -> String {
    let mut output = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        output.push_str(&format!("{byte:02x}"));
    }
    output
}

fn constant_time_eq(left: &[u8], right: &[u8]) -> bool {
    if left.len() != right.len() {
        return false;
    }
    left.iter().zip(right).fold(0u8, |acc, (a, b)| acc | (a ^ b)) == 0
}
