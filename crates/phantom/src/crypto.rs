//! Time-windowed packet encryption keyed by a pre-shared secret
//!
//! Every datagram on the wire is a self-contained AEAD frame:
//!
//! ```plain
//! +--------+-----------+--------+--------------+--------+
//! | UserID | Timestamp | Nonce  | *Ciphertext* |  Tag   |
//! +--------+-----------+--------+--------------+--------+
//! |   4    |     2     |   12   |   Variable   |   16   |
//! +--------+-----------+--------+--------------+--------+
//! ```
//!
//! `UserID ‖ Timestamp` is plaintext but authenticated as AEAD associated
//! data. Session keys rotate with wall-clock time: the key for window `w` is
//! derived from the PSK with HKDF-SHA256, and a receiver accepts frames
//! sealed under the previous, current or next window to absorb clock skew.

use std::time::{SystemTime, UNIX_EPOCH};

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Key, Nonce,
};
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;

/// Pre-shared secret length in bytes
pub const PSK_SIZE: usize = 32;
/// Derived user identifier length in bytes
pub const USER_ID_SIZE: usize = 4;
/// Truncated timestamp length in bytes
pub const TIMESTAMP_SIZE: usize = 2;
/// AEAD nonce length in bytes
pub const NONCE_SIZE: usize = 12;
/// AEAD authentication tag length in bytes
pub const TAG_SIZE: usize = 16;
/// Plaintext frame header, `UserID ‖ Timestamp`, also the AEAD associated data
pub const HEADER_SIZE: usize = USER_ID_SIZE + TIMESTAMP_SIZE;
/// Minimum length of a valid frame: header + nonce + tag around an empty payload
pub const PACKET_OVERHEAD: usize = HEADER_SIZE + NONCE_SIZE + TAG_SIZE;

const USER_ID_INFO: &[u8] = b"phantom-userid-v2";
const SESSION_KEY_INFO: &[u8] = b"phantom-key-v2";

/// Packet cipher error
#[derive(thiserror::Error, Debug)]
pub enum CryptoError {
    #[error("PSK is not valid base64, {0}")]
    PskEncoding(#[from] base64::DecodeError),
    #[error("PSK must be {PSK_SIZE} bytes, but got {0} bytes")]
    PskLength(usize),
    #[error("packet too short, at least {PACKET_OVERHEAD} bytes, but only {0} bytes")]
    PacketTooShort(usize),
    #[error("user id mismatch")]
    ForeignUserId,
    #[error("timestamp outside tolerance")]
    StaleTimestamp,
    #[error("decrypt packet failed")]
    DecryptPacketError,
    #[error("encrypt packet failed")]
    EncryptPacketError,
}

/// Packet cipher result
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Seals and opens relay frames under session keys derived from the PSK.
///
/// Configured once at startup and shared read-only between workers. Session
/// keys are rederived per use; only the PSK and the user id are retained.
pub struct PacketCipher {
    psk: [u8; PSK_SIZE],
    user_id: [u8; USER_ID_SIZE],
    time_window: u64,
}

impl PacketCipher {
    /// Creates a cipher from a base64-encoded PSK and a window length in seconds
    pub fn new(psk_b64: &str, time_window: u64) -> CryptoResult<PacketCipher> {
        let decoded = BASE64_STANDARD.decode(psk_b64)?;
        if decoded.len() != PSK_SIZE {
            return Err(CryptoError::PskLength(decoded.len()));
        }

        let mut psk = [0u8; PSK_SIZE];
        psk.copy_from_slice(&decoded);
        Ok(PacketCipher::from_psk(psk, time_window))
    }

    /// Creates a cipher from raw PSK bytes
    pub fn from_psk(psk: [u8; PSK_SIZE], time_window: u64) -> PacketCipher {
        let user_id = derive_user_id(&psk);
        PacketCipher {
            psk,
            user_id,
            time_window,
        }
    }

    /// The 4-byte public fingerprint of the PSK, sent in clear on every frame
    pub fn user_id(&self) -> [u8; USER_ID_SIZE] {
        self.user_id
    }

    /// Window length in seconds
    pub fn time_window(&self) -> u64 {
        self.time_window
    }

    fn key_for_window(&self, window: u64) -> [u8; PSK_SIZE] {
        let salt = window.to_be_bytes();
        let hk = Hkdf::<Sha256>::new(Some(&salt), &self.psk);
        let mut key = [0u8; PSK_SIZE];
        hk.expand(SESSION_KEY_INFO, &mut key)
            .expect("HKDF-SHA256 expand to 32 bytes");
        key
    }

    fn current_window(&self) -> u64 {
        unix_now() / self.time_window
    }

    // Previous, current and next window, ±1 tolerance for clock skew.
    // Window 0 only underflows with a clock before the epoch.
    fn live_windows(&self) -> [u64; 3] {
        let w = self.current_window();
        [w.wrapping_sub(1), w, w.wrapping_add(1)]
    }

    /// Seals `plaintext` into a wire frame under the current window key
    pub fn seal(&self, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
        self.seal_for_window(self.current_window(), plaintext)
    }

    fn seal_for_window(&self, window: u64, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
        let key = self.key_for_window(window);
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));

        let mut nonce = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce);

        let timestamp = (unix_now() & 0xFFFF) as u16;

        let mut packet = Vec::with_capacity(PACKET_OVERHEAD + plaintext.len());
        packet.extend_from_slice(&self.user_id);
        packet.extend_from_slice(&timestamp.to_be_bytes());
        packet.extend_from_slice(&nonce);

        let ciphertext = cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: plaintext,
                    aad: &packet[..HEADER_SIZE],
                },
            )
            .map_err(|_| CryptoError::EncryptPacketError)?;
        packet.extend_from_slice(&ciphertext);

        Ok(packet)
    }

    /// Opens a wire frame, trying the previous, current and next window keys.
    ///
    /// Cheap rejections run first: length, user id prefix, then the truncated
    /// timestamp, so that frames which cannot possibly authenticate never pay
    /// for the three trial decryptions.
    pub fn open(&self, packet: &[u8]) -> CryptoResult<Vec<u8>> {
        if packet.len() < PACKET_OVERHEAD {
            return Err(CryptoError::PacketTooShort(packet.len()));
        }

        if packet[..USER_ID_SIZE] != self.user_id {
            return Err(CryptoError::ForeignUserId);
        }

        let timestamp = u16::from_be_bytes([packet[USER_ID_SIZE], packet[USER_ID_SIZE + 1]]);
        let now = (unix_now() & 0xFFFF) as u16;
        if timestamp_distance(now, timestamp) > self.time_window * 2 {
            return Err(CryptoError::StaleTimestamp);
        }

        let header = &packet[..HEADER_SIZE];
        let nonce = Nonce::from_slice(&packet[HEADER_SIZE..HEADER_SIZE + NONCE_SIZE]);
        let body = &packet[HEADER_SIZE + NONCE_SIZE..];

        for window in self.live_windows() {
            let key = self.key_for_window(window);
            let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
            if let Ok(plaintext) = cipher.decrypt(
                nonce,
                Payload {
                    msg: body,
                    aad: header,
                },
            ) {
                return Ok(plaintext);
            }
        }

        Err(CryptoError::DecryptPacketError)
    }
}

// The truncated timestamp wraps every ~18.2 hours; distance is measured on
// the 2^16 cycle as the shortest signed arc. A plain unsigned subtraction
// would falsely reject frames that straddle a wrap boundary.
fn timestamp_distance(now: u16, timestamp: u16) -> u64 {
    let diff = now.wrapping_sub(timestamp) as i16;
    u64::from(diff.unsigned_abs())
}

fn derive_user_id(psk: &[u8; PSK_SIZE]) -> [u8; USER_ID_SIZE] {
    let hk = Hkdf::<Sha256>::new(None, psk);
    let mut id = [0u8; USER_ID_SIZE];
    hk.expand(USER_ID_INFO, &mut id)
        .expect("HKDF-SHA256 expand to 4 bytes");
    id
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs()
}

/// Generates a fresh random PSK, encoded as standard base64
pub fn generate_psk() -> String {
    let mut psk = [0u8; PSK_SIZE];
    rand::thread_rng().fill_bytes(&mut psk);
    BASE64_STANDARD.encode(psk)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIME_WINDOW: u64 = 30;

    fn test_cipher() -> PacketCipher {
        PacketCipher::from_psk([7u8; PSK_SIZE], TIME_WINDOW)
    }

    #[test]
    fn generated_psk_decodes_to_psk_size() {
        let psk = generate_psk();
        let decoded = BASE64_STANDARD.decode(psk).unwrap();
        assert_eq!(decoded.len(), PSK_SIZE);
    }

    #[test]
    fn generated_psk_creates_cipher() {
        let psk = generate_psk();
        PacketCipher::new(&psk, TIME_WINDOW).unwrap();
    }

    #[test]
    fn user_id_is_deterministic() {
        let a = PacketCipher::from_psk([7u8; PSK_SIZE], TIME_WINDOW);
        let b = PacketCipher::from_psk([7u8; PSK_SIZE], TIME_WINDOW);
        assert_eq!(a.user_id(), b.user_id());

        let c = PacketCipher::from_psk([8u8; PSK_SIZE], TIME_WINDOW);
        assert_ne!(a.user_id(), c.user_id());
    }

    #[test]
    fn rejects_wrong_psk_length() {
        let short = BASE64_STANDARD.encode([0u8; 16]);
        match PacketCipher::new(&short, TIME_WINDOW) {
            Err(CryptoError::PskLength(16)) => {}
            r => panic!("expected PskLength error, got {:?}", r.map(|_| ())),
        }
    }

    #[test]
    fn rejects_invalid_base64() {
        assert!(matches!(
            PacketCipher::new("not base64 at all!", TIME_WINDOW),
            Err(CryptoError::PskEncoding(..))
        ));
    }

    #[test]
    fn seal_open_round_trip() {
        let cipher = test_cipher();
        let plaintext = b"Hello, Phantom!";

        let packet = cipher.seal(plaintext).unwrap();
        assert_eq!(packet.len(), plaintext.len() + PACKET_OVERHEAD);

        let opened = cipher.open(&packet).unwrap();
        assert_eq!(opened, plaintext);
    }

    #[test]
    fn seal_open_empty_payload() {
        let cipher = test_cipher();
        let packet = cipher.seal(b"").unwrap();
        assert_eq!(packet.len(), PACKET_OVERHEAD);
        assert_eq!(cipher.open(&packet).unwrap(), b"");
    }

    #[test]
    fn opens_frames_from_adjacent_windows() {
        let cipher = test_cipher();
        let w = cipher.current_window();

        for window in [w - 1, w, w + 1] {
            let packet = cipher.seal_for_window(window, b"skewed").unwrap();
            assert_eq!(cipher.open(&packet).unwrap(), b"skewed");
        }
    }

    #[test]
    fn rejects_frames_outside_window_tolerance() {
        let cipher = test_cipher();
        let packet = cipher
            .seal_for_window(cipher.current_window() - 2, b"ancient")
            .unwrap();
        assert!(matches!(
            cipher.open(&packet),
            Err(CryptoError::DecryptPacketError)
        ));
    }

    #[test]
    fn rejects_foreign_psk() {
        let ours = test_cipher();
        let theirs = PacketCipher::from_psk([8u8; PSK_SIZE], TIME_WINDOW);

        let packet = theirs.seal(b"secret").unwrap();
        assert!(matches!(
            ours.open(&packet),
            Err(CryptoError::ForeignUserId)
        ));
    }

    #[test]
    fn rejects_forged_user_id() {
        // Same user id on the wire, different key material underneath
        let ours = test_cipher();
        let theirs = PacketCipher::from_psk([8u8; PSK_SIZE], TIME_WINDOW);

        let mut packet = theirs.seal(b"secret").unwrap();
        packet[..USER_ID_SIZE].copy_from_slice(&ours.user_id());
        assert!(matches!(
            ours.open(&packet),
            Err(CryptoError::DecryptPacketError)
        ));
    }

    #[test]
    fn rejects_tampered_ciphertext() {
        let cipher = test_cipher();
        let mut packet = cipher.seal(b"integrity").unwrap();
        packet[HEADER_SIZE + NONCE_SIZE] ^= 0x01;
        assert!(matches!(
            cipher.open(&packet),
            Err(CryptoError::DecryptPacketError)
        ));
    }

    #[test]
    fn rejects_short_packet() {
        let cipher = test_cipher();
        assert!(matches!(
            cipher.open(&[0u8; PACKET_OVERHEAD - 1]),
            Err(CryptoError::PacketTooShort(..))
        ));
    }

    #[test]
    fn timestamp_distance_is_modular() {
        // Straddling the wrap boundary in both directions
        assert_eq!(timestamp_distance(0x0005, 0xFFFB), 10);
        assert_eq!(timestamp_distance(0xFFFB, 0x0005), 10);
        // Plain distances
        assert_eq!(timestamp_distance(100, 40), 60);
        assert_eq!(timestamp_distance(40, 100), 60);
        // Antipode
        assert_eq!(timestamp_distance(0, 0x8000), 32768);
    }
}
