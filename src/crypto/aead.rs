//! AES-GCM, AES-CTR, and AES-CBC primitives (C1), grounded on the teacher's
//! `util::crypto::AesGcm` wrapper and extended with the CTR/CBC modes the
//! Signal/ADV layers need.

use crate::error::CryptoError;
use aes::cipher::{KeyIvInit, StreamCipher};
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut};
use rand::RngCore;

type Aes256Ctr = ctr::Ctr128BE<aes::Aes256>;
type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// AES-256-GCM with a 12-byte nonce and a 16-byte tag suffixed onto the
/// ciphertext, matching the teacher's `AesGcm::encrypt` layout.
pub fn gcm_encrypt(key: &[u8; 32], nonce: &[u8; 12], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new(key.into());
    cipher
        .encrypt(Nonce::from_slice(nonce), Payload { msg: plaintext, aad })
        .map_err(|_| CryptoError::BadTag)
}

/// Splits off the trailing 16-byte tag and verifies it during decryption.
pub fn gcm_decrypt(key: &[u8; 32], nonce: &[u8; 12], ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.len() < 16 {
        return Err(CryptoError::BadTag);
    }
    let cipher = Aes256Gcm::new(key.into());
    cipher
        .decrypt(Nonce::from_slice(nonce), Payload { msg: ciphertext, aad })
        .map_err(|_| CryptoError::BadTag)
}

/// AES-256-CTR keystream XOR, used for ADV attribute encryption.
pub fn ctr_apply(key: &[u8; 32], iv: &[u8; 16], data: &[u8]) -> Vec<u8> {
    let mut buf = data.to_vec();
    let mut cipher = Aes256Ctr::new(key.into(), iv.into());
    cipher.apply_keystream(&mut buf);
    buf
}

/// AES-256-CBC encrypt with PKCS#7 padding; prepends a fresh random 16-byte
/// IV to the returned buffer, the convention used throughout the pairing and
/// app-state layers.
pub fn cbc_encrypt(key: &[u8; 32], plaintext: &[u8]) -> Vec<u8> {
    let mut iv = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut iv);

    let encryptor = Aes256CbcEnc::new(key.into(), &iv.into());
    let ciphertext = encryptor.encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let mut out = Vec::with_capacity(16 + ciphertext.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&ciphertext);
    out
}

/// Inverse of [`cbc_encrypt`]: the first 16 bytes are the IV.
pub fn cbc_decrypt(key: &[u8; 32], data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if data.len() < 16 {
        return Err(CryptoError::PadError);
    }
    let (iv, ciphertext) = data.split_at(16);
    let decryptor = Aes256CbcDec::new(key.into(), iv.into());
    decryptor
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CryptoError::PadError)
}

/// `padPKCS7(msg, block=16)` — standalone from the CBC helpers above,
/// since pkmsg/msg plaintext is padded independently of any CBC framing
/// (spec.md §4.1, §4.6 step 6).
pub fn pad_pkcs7(msg: &[u8], block: usize) -> Vec<u8> {
    let pad_len = block - (msg.len() % block);
    let mut out = Vec::with_capacity(msg.len() + pad_len);
    out.extend_from_slice(msg);
    out.resize(out.len() + pad_len, pad_len as u8);
    out
}

/// `unpadPKCS7(buf)` — the last byte is the pad length in `[1, 16]`; every
/// pad byte must equal that length, or this fails with `PadError`.
/// Unpadding an empty buffer fails.
pub fn unpad_pkcs7(buf: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let Some(&pad_len) = buf.last() else {
        return Err(CryptoError::PadError);
    };
    let pad_len = pad_len as usize;
    if pad_len == 0 || pad_len > 16 || pad_len > buf.len() {
        return Err(CryptoError::PadError);
    }
    let data_len = buf.len() - pad_len;
    if buf[data_len..].iter().any(|&b| b as usize != pad_len) {
        return Err(CryptoError::PadError);
    }
    Ok(buf[..data_len].to_vec())
}
