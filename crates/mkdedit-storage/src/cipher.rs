use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
    Aes256Gcm, Key, Nonce,
};
use mkdedit_core::storage::FileStoreError;

use crate::key_provider::KeyMaterial;

const NONCE_LEN: usize = 12;

/// Seals values as `nonce || ciphertext`, authenticated against the entry name
/// so a value copied under another key fails to open.
#[derive(Clone)]
pub struct ValueCipher {
    cipher: Aes256Gcm,
}

impl ValueCipher {
    pub fn new(material: &KeyMaterial) -> Self {
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&material.bytes)),
        }
    }

    pub fn seal(&self, name: &str, plaintext: &[u8]) -> Result<Vec<u8>, FileStoreError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(
                &nonce,
                Payload {
                    msg: plaintext,
                    aad: name.as_bytes(),
                },
            )
            .map_err(|e| FileStoreError::Storage {
                reason: format!("encrypt failed: {e}"),
            })?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(nonce.as_slice());
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    pub fn open(&self, name: &str, sealed: &[u8]) -> Result<Vec<u8>, FileStoreError> {
        if sealed.len() < NONCE_LEN {
            return Err(FileStoreError::Storage {
                reason: format!("sealed value for {name} is truncated"),
            });
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        self.cipher
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: ciphertext,
                    aad: name.as_bytes(),
                },
            )
            .map_err(|e| FileStoreError::Storage {
                reason: format!("decrypt failed for {name}: {e}"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_provider::KEY_LEN;

    fn cipher(byte: u8) -> ValueCipher {
        ValueCipher::new(&KeyMaterial {
            id: "test".into(),
            bytes: [byte; KEY_LEN],
        })
    }

    #[test]
    fn sealed_value_hides_plaintext_and_opens() {
        let cipher = cipher(1);
        let sealed = cipher.seal("notes.md", b"hello-mkdedit").expect("seal");

        assert!(!sealed
            .windows(b"hello-mkdedit".len())
            .any(|w| w == b"hello-mkdedit"));
        assert_eq!(cipher.open("notes.md", &sealed).expect("open"), b"hello-mkdedit");
    }

    #[test]
    fn open_fails_under_another_key_or_name() {
        let sealed = cipher(1).seal("a", b"payload").expect("seal");

        assert!(cipher(2).open("a", &sealed).is_err());
        assert!(cipher(1).open("b", &sealed).is_err());
        assert!(cipher(1).open("a", &sealed[..4]).is_err());
    }
}
