//! Per-channel stream cipher.
//!
//! Key schedule: the SHA-1 digest of the raw shared secret seeds two
//! independent RC4 keystreams, one per direction. There is no IV, no
//! rekeying and no authentication tag; every channel (TCP session, UDP
//! association, gateway uplink) derives a fresh pair from the same
//! secret, so keystream positions repeat across channels. This is an
//! obfuscation layer, not an AEAD — the frame signature check is the
//! only integrity signal the protocol has. Do not rely on it against
//! an adversary who can observe or splice traffic.

use rc4::consts::U20;
use rc4::{Key, KeyInit, Rc4, StreamCipher};
use sha1::{Digest, Sha1};

/// One direction of a session's keystream.
pub struct CipherHalf(Rc4<U20>);

impl CipherHalf {
    fn new(secret: &[u8]) -> Self {
        let digest = Sha1::digest(secret);
        CipherHalf(Rc4::new(Key::<U20>::from_slice(digest.as_slice())))
    }

    /// XOR the next keystream bytes into `buf` in place.
    pub fn apply(&mut self, buf: &mut [u8]) {
        self.0.apply_keystream(buf);
    }
}

/// Both keystream directions of one channel.
///
/// Owned by exactly one session; the two halves advance independently.
pub struct SessionCipher {
    enc: CipherHalf,
    dec: CipherHalf,
}

impl SessionCipher {
    /// Derive a fresh keystream pair from the shared secret.
    pub fn new(secret: &str) -> Self {
        Self {
            enc: CipherHalf::new(secret.as_bytes()),
            dec: CipherHalf::new(secret.as_bytes()),
        }
    }

    /// Encipher outbound bytes in place.
    pub fn encrypt(&mut self, buf: &mut [u8]) {
        self.enc.apply(buf);
    }

    /// Decipher inbound bytes in place.
    pub fn decrypt(&mut self, buf: &mut [u8]) {
        self.dec.apply(buf);
    }

    /// Split into `(encrypt, decrypt)` halves so the two relay
    /// directions of a session can run concurrently.
    pub fn into_halves(self) -> (CipherHalf, CipherHalf) {
        (self.enc, self.dec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_pairs_are_symmetric() {
        let mut local = SessionCipher::new("secret");
        let mut remote = SessionCipher::new("secret");

        let mut data = b"the quick brown fox".to_vec();
        local.encrypt(&mut data);
        assert_ne!(&data, b"the quick brown fox");
        remote.decrypt(&mut data);
        assert_eq!(&data, b"the quick brown fox");
    }

    #[test]
    fn symmetry_holds_in_both_directions() {
        let mut local = SessionCipher::new("secret");
        let mut remote = SessionCipher::new("secret");

        let mut reply = b"frame from the remote side".to_vec();
        remote.encrypt(&mut reply);
        local.decrypt(&mut reply);
        assert_eq!(&reply, b"frame from the remote side");
    }

    #[test]
    fn directions_advance_independently() {
        let mut a = SessionCipher::new("secret");
        let mut b = SessionCipher::new("secret");

        // Advance only the encrypt side of `a`; its decrypt side must
        // still line up with a fresh peer's encrypt stream.
        let mut noise = vec![0u8; 64];
        a.encrypt(&mut noise);

        let mut data = b"unaffected".to_vec();
        b.encrypt(&mut data);
        a.decrypt(&mut data);
        assert_eq!(&data, b"unaffected");
    }

    #[test]
    fn keystream_is_stateful_across_chunks() {
        let mut whole = SessionCipher::new("secret");
        let mut chunked = SessionCipher::new("secret");

        let mut one = vec![7u8; 48];
        whole.encrypt(&mut one);

        let mut two = vec![7u8; 48];
        chunked.encrypt(&mut two[..13]);
        chunked.encrypt(&mut two[13..]);
        assert_eq!(one, two);
    }

    #[test]
    fn different_secrets_disagree() {
        let mut a = SessionCipher::new("secret");
        let mut b = SessionCipher::new("other");

        let mut data = b"mismatch".to_vec();
        a.encrypt(&mut data);
        b.decrypt(&mut data);
        assert_ne!(&data, b"mismatch");
    }
}
