//! Challenge crypto for endpoint authentication.
//!
//! The mediator proves an endpoint holds the private half of its
//! advertised public key by encrypting a random nonce to that key. The
//! primitive is a sealed box: ephemeral X25519 ECDH against the
//! recipient's static key, a BLAKE3-derived AEAD key, and
//! ChaCha20-Poly1305 for the payload.
//!
//! Ciphertext layout: [ephemeral public key (32) | AEAD nonce (12) | ct+tag].
//!
//! Whether the returned proof is actually checked against the issued
//! nonce is a policy decision ([`VerifyPolicy`]), not hardwired behavior.

use chacha20poly1305::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    ChaCha20Poly1305, Key, Nonce,
};
use rand::RngCore;
use thiserror::Error;
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// X25519 public keys are exactly this long.
pub const KEY_LEN: usize = 32;

/// AEAD nonce length for ChaCha20-Poly1305.
const AEAD_NONCE_LEN: usize = 12;

/// Domain separation string for the sealed-box KDF.
const KDF_CONTEXT: &str = "waypost sealed-box v1";

#[derive(Debug, Error)]
pub enum ChallengeError {
    #[error("public key must be {KEY_LEN} bytes, got {0}")]
    BadKey(usize),

    #[error("ciphertext too short to contain key and nonce")]
    TooShort,

    #[error("AEAD open failed — wrong key or tampered ciphertext")]
    Aead,
}

/// Generate a random 16-byte challenge nonce.
pub fn generate_nonce() -> [u8; 16] {
    let mut nonce = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut nonce);
    nonce
}

/// The challenge primitive the connection handler consumes. Pluggable so
/// tests can substitute a deterministic cipher.
pub trait ChallengeCipher: Send + Sync {
    /// Encrypt `plaintext` so that only the holder of the private half of
    /// `public_key` can recover it.
    fn encrypt_for(&self, public_key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, ChallengeError>;
}

/// Production sealed-box cipher.
pub struct SealedBox;

impl SealedBox {
    /// Seal `plaintext` to a 32-byte X25519 public key.
    pub fn seal(public_key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, ChallengeError> {
        let recipient: [u8; KEY_LEN] = public_key
            .try_into()
            .map_err(|_| ChallengeError::BadKey(public_key.len()))?;
        let recipient = PublicKey::from(recipient);

        let ephemeral = EphemeralSecret::random_from_rng(rand::thread_rng());
        let ephemeral_public = PublicKey::from(&ephemeral);
        let shared = ephemeral.diffie_hellman(&recipient);

        let key = derive_aead_key(shared.as_bytes(), ephemeral_public.as_bytes(), recipient.as_bytes());
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
        let aead_nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ct = cipher
            .encrypt(&aead_nonce, plaintext)
            .map_err(|_| ChallengeError::Aead)?;

        let mut out = Vec::with_capacity(KEY_LEN + AEAD_NONCE_LEN + ct.len());
        out.extend_from_slice(ephemeral_public.as_bytes());
        out.extend_from_slice(&aead_nonce);
        out.extend_from_slice(&ct);
        Ok(out)
    }

    /// Endpoint-side counterpart: recover the plaintext with the static
    /// private key matching the public key the box was sealed to.
    pub fn open(keypair: &Keypair, ciphertext: &[u8]) -> Result<Vec<u8>, ChallengeError> {
        if ciphertext.len() < KEY_LEN + AEAD_NONCE_LEN {
            return Err(ChallengeError::TooShort);
        }
        let (eph_bytes, rest) = ciphertext.split_at(KEY_LEN);
        let (nonce_bytes, ct) = rest.split_at(AEAD_NONCE_LEN);

        let mut eph = [0u8; KEY_LEN];
        eph.copy_from_slice(eph_bytes);
        let ephemeral_public = PublicKey::from(eph);
        let secret = StaticSecret::from(*keypair.private);
        let shared = secret.diffie_hellman(&ephemeral_public);

        let key = derive_aead_key(shared.as_bytes(), ephemeral_public.as_bytes(), &keypair.public);
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
        cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ct)
            .map_err(|_| ChallengeError::Aead)
    }
}

impl ChallengeCipher for SealedBox {
    fn encrypt_for(&self, public_key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, ChallengeError> {
        Self::seal(public_key, plaintext)
    }
}

fn derive_aead_key(shared: &[u8; 32], ephemeral: &[u8; 32], recipient: &[u8; 32]) -> [u8; 32] {
    let mut ikm = [0u8; 96];
    ikm[..32].copy_from_slice(shared);
    ikm[32..64].copy_from_slice(ephemeral);
    ikm[64..].copy_from_slice(recipient);
    blake3::derive_key(KDF_CONTEXT, &ikm)
}

// ── Keypair ───────────────────────────────────────────────────────────────────

/// An endpoint's static X25519 keypair. The public half doubles as the
/// pairing key in the mediation protocol.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Keypair {
    /// Private key — zeroized on drop, never exposed directly.
    private: Zeroizing<[u8; 32]>,
    /// Public key — advertised to the mediator.
    pub public: [u8; 32],
}

impl Keypair {
    /// Generate a new random X25519 keypair.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(rand::thread_rng());
        let public = PublicKey::from(&secret);
        Self {
            private: Zeroizing::new(secret.to_bytes()),
            public: *public.as_bytes(),
        }
    }

    /// Reconstruct a keypair from stored private key bytes.
    pub fn from_private(private_bytes: [u8; 32]) -> Self {
        let secret = StaticSecret::from(private_bytes);
        let public = PublicKey::from(&secret);
        Self {
            private: Zeroizing::new(private_bytes),
            public: *public.as_bytes(),
        }
    }
}

// ── Verification policy ───────────────────────────────────────────────────────

/// What the mediator does with an AdvertiseResponse proof.
///
/// `None` accepts any response without inspecting it and is the default;
/// `NonceEcho` requires the proof to equal the issued nonce exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VerifyPolicy {
    #[default]
    None,
    NonceEcho,
}

impl VerifyPolicy {
    pub fn accepts(&self, issued_nonce: &[u8], proof: &[u8]) -> bool {
        match self {
            Self::None => true,
            Self::NonceEcho => issued_nonce == proof,
        }
    }
}
