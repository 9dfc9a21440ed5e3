use fedlink_registry::PeerSnapshot;
use fedlink_types::CertSlot;
use sha2::{Digest, Sha256};

/// SHA-256 over the parts of a peer's configuration that shape its session.
///
/// A running link is restarted when this changes. Name, notes, enabled and
/// the routing filter are excluded: none of them needs a new socket.
pub fn fingerprint(snapshot: &PeerSnapshot) -> String {
    let mut hasher = Sha256::new();
    field(&mut hasher, snapshot.address.as_bytes());
    field(&mut hasher, &snapshot.port.to_be_bytes());
    field(&mut hasher, snapshot.protocol.as_str().as_bytes());
    optional(&mut hasher, snapshot.username.as_deref().map(str::as_bytes));
    optional(&mut hasher, snapshot.password.as_deref().map(str::as_bytes));
    for slot in CertSlot::ALL {
        match snapshot.credentials.get(slot) {
            Some(cert) => {
                hasher.update([1u8]);
                field(&mut hasher, cert.format.as_str().as_bytes());
                field(&mut hasher, &cert.data);
            }
            None => hasher.update([0u8]),
        }
    }
    hex::encode(hasher.finalize())
}

fn field(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_be_bytes());
    hasher.update(bytes);
}

fn optional(hasher: &mut Sha256, bytes: Option<&[u8]>) {
    match bytes {
        Some(b) => {
            hasher.update([1u8]);
            field(hasher, b);
        }
        None => hasher.update([0u8]),
    }
}
