//! PKCS#12 bundle reading.
//!
//! `p12` parses the ASN.1 structure and decrypts the legacy SHA-1 PBE
//! ciphers. Bundles written by current exporters (OpenSSL 3, Windows
//! "AES256-SHA256") use an HMAC-SHA-2 integrity MAC and PBES2/AES-CBC
//! encrypted contents, which are handled here.

use aes::{Aes128, Aes192, Aes256};
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, InvalidLength, KeyIvInit};
use hmac::{Hmac, Mac};
use p12::{AlgorithmIdentifier, ContentInfo, MacData, PFX, SafeBag, SafeBagKind};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};
use yasna::models::ObjectIdentifier;

use super::CertificateError;

/// PKCS#12 KDF diversifier for MAC keys (RFC 7292 B.3).
const MAC_KEY_ID: u8 = 3;

const OID_PBES2: &[u64] = &[1, 2, 840, 113_549, 1, 5, 13];
const OID_PBKDF2: &[u64] = &[1, 2, 840, 113_549, 1, 5, 12];
const OID_KEY_BAG: &[u64] = &[1, 2, 840, 113_549, 1, 12, 10, 1, 1];

/// What an unlocked bundle holds.
#[derive(Debug, Default)]
pub(super) struct BundleContents {
    pub certificates: Vec<Vec<u8>>,
    pub has_private_key: bool,
}

/// Hash behind the integrity MAC or the PBKDF2 PRF.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HashKind {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl HashKind {
    fn from_digest_oid(oid: &ObjectIdentifier) -> Option<Self> {
        match oid.components().as_slice() {
            [1, 3, 14, 3, 2, 26] => Some(Self::Sha1),
            [2, 16, 840, 1, 101, 3, 4, 2, 1] => Some(Self::Sha256),
            [2, 16, 840, 1, 101, 3, 4, 2, 2] => Some(Self::Sha384),
            [2, 16, 840, 1, 101, 3, 4, 2, 3] => Some(Self::Sha512),
            _ => None,
        }
    }

    fn from_hmac_oid(oid: &ObjectIdentifier) -> Option<Self> {
        match oid.components().as_slice() {
            [1, 2, 840, 113_549, 2, 7] => Some(Self::Sha1),
            [1, 2, 840, 113_549, 2, 9] => Some(Self::Sha256),
            [1, 2, 840, 113_549, 2, 10] => Some(Self::Sha384),
            [1, 2, 840, 113_549, 2, 11] => Some(Self::Sha512),
            _ => None,
        }
    }

    /// Input block size in bytes (`v` in RFC 7292).
    fn block_len(self) -> usize {
        match self {
            Self::Sha1 | Self::Sha256 => 64,
            Self::Sha384 | Self::Sha512 => 128,
        }
    }

    fn output_len(self) -> usize {
        match self {
            Self::Sha1 => 20,
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AesCbc {
    Aes128,
    Aes192,
    Aes256,
}

impl AesCbc {
    fn from_oid(oid: &ObjectIdentifier) -> Option<Self> {
        match oid.components().as_slice() {
            [2, 16, 840, 1, 101, 3, 4, 1, 2] => Some(Self::Aes128),
            [2, 16, 840, 1, 101, 3, 4, 1, 22] => Some(Self::Aes192),
            [2, 16, 840, 1, 101, 3, 4, 1, 42] => Some(Self::Aes256),
            _ => None,
        }
    }

    fn key_len(self) -> usize {
        match self {
            Self::Aes128 => 16,
            Self::Aes192 => 24,
            Self::Aes256 => 32,
        }
    }
}

#[derive(Debug)]
struct Pbes2Params {
    salt: Vec<u8>,
    iterations: u32,
    prf: HashKind,
    cipher: AesCbc,
    iv: Vec<u8>,
}

impl Pbes2Params {
    fn parse(der: &[u8]) -> Result<Self, String> {
        let (kdf, salt, iterations, prf, cipher, iv) = yasna::parse_der(der, |r| {
            r.read_sequence(|r| {
                let (kdf, salt, iterations, prf) = r.next().read_sequence(|r| {
                    let kdf = r.next().read_oid()?;
                    let (salt, iterations, prf) = r.next().read_sequence(|r| {
                        let salt = r.next().read_bytes()?;
                        let iterations = r.next().read_u32()?;
                        r.read_optional(|r| r.read_u32())?;
                        let prf = r.read_optional(|r| {
                            r.read_sequence(|r| {
                                let oid = r.next().read_oid()?;
                                r.read_optional(|r| r.read_null())?;
                                Ok(oid)
                            })
                        })?;
                        Ok((salt, iterations, prf))
                    })?;
                    Ok((kdf, salt, iterations, prf))
                })?;
                let (cipher, iv) = r.next().read_sequence(|r| {
                    let cipher = r.next().read_oid()?;
                    let iv = r.next().read_bytes()?;
                    Ok((cipher, iv))
                })?;
                Ok((kdf, salt, iterations, prf, cipher, iv))
            })
        })
        .map_err(|error| format!("malformed PBES2 parameters: {error:?}"))?;

        if kdf.components().as_slice() != OID_PBKDF2 {
            return Err(format!("unsupported PBES2 key derivation {kdf}"));
        }
        let prf = match prf {
            None => HashKind::Sha1,
            Some(oid) => HashKind::from_hmac_oid(&oid).ok_or_else(|| format!("unsupported PBKDF2 PRF {oid}"))?,
        };
        let cipher = AesCbc::from_oid(&cipher).ok_or_else(|| format!("unsupported PBES2 cipher {cipher}"))?;

        Ok(Self {
            salt,
            iterations,
            prf,
            cipher,
            iv,
        })
    }

    /// `Ok(None)` when the padding does not check out, which is what a wrong
    /// passphrase looks like.
    fn decrypt(&self, ciphertext: &[u8], password: &[u8]) -> Result<Option<Vec<u8>>, String> {
        let mut key = vec![0_u8; self.cipher.key_len()];
        match self.prf {
            HashKind::Sha1 => pbkdf2::pbkdf2_hmac::<Sha1>(password, &self.salt, self.iterations, &mut key),
            HashKind::Sha256 => pbkdf2::pbkdf2_hmac::<Sha256>(password, &self.salt, self.iterations, &mut key),
            HashKind::Sha384 => pbkdf2::pbkdf2_hmac::<Sha384>(password, &self.salt, self.iterations, &mut key),
            HashKind::Sha512 => pbkdf2::pbkdf2_hmac::<Sha512>(password, &self.salt, self.iterations, &mut key),
        }

        let bad_iv = |_: InvalidLength| format!("PBES2 IV must be 16 bytes, got {}", self.iv.len());
        let plaintext = match self.cipher {
            AesCbc::Aes128 => cbc::Decryptor::<Aes128>::new_from_slices(&key, &self.iv)
                .map_err(bad_iv)?
                .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
                .ok(),
            AesCbc::Aes192 => cbc::Decryptor::<Aes192>::new_from_slices(&key, &self.iv)
                .map_err(bad_iv)?
                .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
                .ok(),
            AesCbc::Aes256 => cbc::Decryptor::<Aes256>::new_from_slices(&key, &self.iv)
                .map_err(bad_iv)?
                .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
                .ok(),
        };
        Ok(plaintext)
    }
}

/// Opens a PKCS#12 bundle, checking the integrity MAC when one is present.
///
/// A MAC mismatch is [`CertificateError::InvalidSecret`]. Bundles without a
/// MAC fall back to the decryption result to tell a wrong passphrase apart.
pub(super) fn open(bytes: &[u8], password: &str, locator: &str) -> Result<BundleContents, CertificateError> {
    let pfx = PFX::parse(bytes)
        .map_err(|error| CertificateError::unsupported(locator, format!("not a PKCS#12 bundle: {error:?}")))?;
    let ContentInfo::Data(auth_safe) = &pfx.auth_safe else {
        return Err(CertificateError::unsupported(
            locator,
            "only password-integrity PKCS#12 bundles are supported",
        ));
    };

    let bmp = bmp_password(password);
    let mac_checked = match &pfx.mac_data {
        Some(mac_data) => {
            if !mac_matches(mac_data, &bmp, auth_safe).map_err(|reason| CertificateError::unsupported(locator, reason))? {
                return Err(CertificateError::InvalidSecret {
                    locator: locator.to_string(),
                });
            }
            true
        }
        None => false,
    };

    let contents = yasna::parse_der(auth_safe, |r| r.collect_sequence_of(ContentInfo::parse))
        .map_err(|error| CertificateError::unsupported(locator, format!("malformed authenticated safe: {error:?}")))?;

    let mut bundle = BundleContents::default();
    for content in &contents {
        let bags = match content {
            ContentInfo::Data(data) => parse_bags(data)
                .map_err(|error| CertificateError::unsupported(locator, format!("malformed safe contents: {error:?}")))?,
            ContentInfo::EncryptedData(encrypted) => {
                let info = &encrypted.encrypted_content_info;
                let plaintext = decrypt(
                    &info.content_encryption_algorithm,
                    &info.encrypted_content,
                    password,
                    &bmp,
                )
                .map_err(|reason| CertificateError::unsupported(locator, reason))?;
                match plaintext.and_then(|plaintext| parse_bags(&plaintext).ok()) {
                    Some(bags) => bags,
                    None if mac_checked => {
                        return Err(CertificateError::unsupported(
                            locator,
                            "encrypted contents do not decrypt with the verified passphrase",
                        ));
                    }
                    None => {
                        return Err(CertificateError::InvalidSecret {
                            locator: locator.to_string(),
                        });
                    }
                }
            }
            ContentInfo::OtherContext(other) => {
                return Err(CertificateError::unsupported(
                    locator,
                    format!("unsupported content type {}", other.content_type),
                ));
            }
        };

        for bag in bags {
            if let Some(der) = bag.bag.get_x509_cert() {
                bundle.certificates.push(der);
            }
            bundle.has_private_key |= holds_key(&bag.bag);
        }
    }
    Ok(bundle)
}

fn holds_key(bag: &SafeBagKind) -> bool {
    match bag {
        SafeBagKind::Pkcs8ShroudedKeyBag(_) => true,
        SafeBagKind::OtherBagKind(other) => other.bag_id.components().as_slice() == OID_KEY_BAG,
        SafeBagKind::CertBag(_) => false,
    }
}

fn parse_bags(der: &[u8]) -> Result<Vec<SafeBag>, yasna::ASN1Error> {
    yasna::parse_der(der, |r| r.collect_sequence_of(SafeBag::parse))
}

/// `Err` for algorithms this reader does not know, `Ok(None)` when
/// decryption fails.
fn decrypt(
    algorithm: &AlgorithmIdentifier,
    ciphertext: &[u8],
    password: &str,
    bmp: &[u8],
) -> Result<Option<Vec<u8>>, String> {
    match algorithm {
        AlgorithmIdentifier::PbewithSHAAnd40BitRC2CBC(_) | AlgorithmIdentifier::PbeWithSHAAnd3KeyTripleDESCBC(_) => {
            Ok(algorithm.decrypt_pbe(ciphertext, bmp))
        }
        AlgorithmIdentifier::OtherAlg(other) if other.algorithm_type.components().as_slice() == OID_PBES2 => {
            let params = other
                .params
                .as_deref()
                .ok_or_else(|| "PBES2 without parameters".to_string())?;
            Pbes2Params::parse(params)?.decrypt(ciphertext, password.as_bytes())
        }
        AlgorithmIdentifier::OtherAlg(other) => Err(format!("unsupported content encryption {}", other.algorithm_type)),
        AlgorithmIdentifier::Sha1 => Err("SHA-1 is not a content encryption algorithm".to_string()),
    }
}

fn mac_matches(mac_data: &MacData, bmp: &[u8], data: &[u8]) -> Result<bool, String> {
    let hash = match &mac_data.mac.digest_algorithm {
        AlgorithmIdentifier::Sha1 => HashKind::Sha1,
        AlgorithmIdentifier::OtherAlg(other) => HashKind::from_digest_oid(&other.algorithm_type)
            .ok_or_else(|| format!("unsupported MAC digest {}", other.algorithm_type))?,
        _ => return Err("unsupported MAC digest".to_string()),
    };
    let salt = &mac_data.salt;
    let iterations = mac_data.iterations;
    let expected = &mac_data.mac.digest;

    let matched = match hash {
        HashKind::Sha1 => Hmac::<Sha1>::new_from_slice(&derive_key::<Sha1>(hash, MAC_KEY_ID, bmp, salt, iterations))
            .map(|mac| mac.chain_update(data).verify_slice(expected).is_ok()),
        HashKind::Sha256 => {
            Hmac::<Sha256>::new_from_slice(&derive_key::<Sha256>(hash, MAC_KEY_ID, bmp, salt, iterations))
                .map(|mac| mac.chain_update(data).verify_slice(expected).is_ok())
        }
        HashKind::Sha384 => {
            Hmac::<Sha384>::new_from_slice(&derive_key::<Sha384>(hash, MAC_KEY_ID, bmp, salt, iterations))
                .map(|mac| mac.chain_update(data).verify_slice(expected).is_ok())
        }
        HashKind::Sha512 => {
            Hmac::<Sha512>::new_from_slice(&derive_key::<Sha512>(hash, MAC_KEY_ID, bmp, salt, iterations))
                .map(|mac| mac.chain_update(data).verify_slice(expected).is_ok())
        }
    };
    Ok(matched.unwrap_or(false))
}

fn derive_key<D: Digest>(hash: HashKind, id: u8, bmp: &[u8], salt: &[u8], iterations: u32) -> Vec<u8> {
    pkcs12_kdf::<D>(hash.block_len(), id, bmp, salt, iterations, hash.output_len())
}

/// RFC 7292 appendix B.2 key derivation.
fn pkcs12_kdf<D: Digest>(block_len: usize, id: u8, password: &[u8], salt: &[u8], iterations: u32, len: usize) -> Vec<u8> {
    let fill = |source: &[u8]| -> Vec<u8> {
        let size = source.len().div_ceil(block_len) * block_len;
        source.iter().copied().cycle().take(size).collect()
    };
    let diversifier = vec![id; block_len];
    let mut input = fill(salt);
    input.extend(fill(password));

    let mut output = Vec::with_capacity(len);
    loop {
        let mut round = D::new().chain_update(&diversifier).chain_update(&input).finalize().to_vec();
        for _ in 1..iterations {
            round = D::digest(&round).to_vec();
        }
        output.extend_from_slice(&round);
        if output.len() >= len {
            break;
        }

        let addend: Vec<u8> = round.iter().copied().cycle().take(block_len).collect();
        for chunk in input.chunks_mut(block_len) {
            add_one_plus(chunk, &addend);
        }
    }
    output.truncate(len);
    output
}

/// `chunk = (chunk + addend + 1) mod 2^(8 * len)`, big-endian.
fn add_one_plus(chunk: &mut [u8], addend: &[u8]) {
    let mut carry = 1_u16;
    for (byte, add) in chunk.iter_mut().zip(addend).rev() {
        let [low, high] = (u16::from(*byte) + u16::from(*add) + carry).to_le_bytes();
        *byte = low;
        carry = u16::from(high);
    }
}

/// UTF-16BE with a two-byte terminator.
fn bmp_password(password: &str) -> Vec<u8> {
    let mut bytes: Vec<u8> = password.encode_utf16().flat_map(u16::to_be_bytes).collect();
    bytes.extend([0, 0]);
    bytes
}
