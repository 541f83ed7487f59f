//! Standard security handler, revisions 2 and 3 (RC4).
//!
//! Only key derivation and password checks live here; the `XRef` decides
//! when strings and stream bodies go through `decrypt`.

use crate::codec::arcfour::rc4;
use crate::error::{PasswordCode, PdfError, Result};
use crate::model::objects::{Dict, ObjRef};

/// Password padding string (PDF 32000 7.6.3.3, Algorithm 2).
pub const PASSWORD_PADDING: [u8; 32] = [
    0x28, 0xBF, 0x4E, 0x5E, 0x4E, 0x75, 0x8A, 0x41, 0x64, 0x00, 0x4E, 0x56, 0xFF, 0xFA, 0x01, 0x08,
    0x2E, 0x2E, 0x00, 0xB6, 0xD0, 0x68, 0x3E, 0x80, 0x2F, 0x0C, 0xA9, 0xFE, 0x64, 0x53, 0x69, 0x7A,
];

/// Parameters of a `/Standard` encryption dictionary with V 1 or 2.
#[derive(Debug, Clone)]
pub struct StandardSecurityHandler {
    revision: i64,
    /// Key length in bytes.
    key_len: usize,
    o: Vec<u8>,
    u: Vec<u8>,
    p: i32,
    id0: Vec<u8>,
}

impl StandardSecurityHandler {
    /// Reads the encryption dictionary. Handlers other than RC4 R2/R3 are
    /// reported as `EncryptionError` so the caller can defer the failure.
    pub fn from_dict(encrypt: &Dict, id0: &[u8]) -> Result<Self> {
        let filter = encrypt.get_name("Filter");
        if filter.is_some_and(|f| f != "Standard") {
            return Err(PdfError::EncryptionError(format!(
                "unsupported security handler /{}",
                filter.map_or("", |f| f.as_str())
            )));
        }
        let int = |key: &str| encrypt.get(key).and_then(|v| v.as_int().ok());
        let v = int("V").unwrap_or(0);
        let revision = int("R").ok_or_else(|| PdfError::KeyError("R".into()))?;
        if !matches!(v, 0..=2) || !matches!(revision, 2 | 3) {
            return Err(PdfError::EncryptionError(format!(
                "unsupported encryption V={v} R={revision}"
            )));
        }
        let bytes = |key: &str| {
            encrypt
                .get(key)
                .and_then(|v| v.as_string().ok())
                .map(<[u8]>::to_vec)
                .ok_or_else(|| PdfError::KeyError(key.into()))
        };
        let key_len = if revision == 2 {
            5
        } else {
            (int("Length").unwrap_or(40).clamp(40, 128) / 8) as usize
        };
        Ok(Self {
            revision,
            key_len,
            o: bytes("O")?,
            u: bytes("U")?,
            p: int("P").ok_or_else(|| PdfError::KeyError("P".into()))? as i32,
            id0: id0.to_vec(),
        })
    }

    /// Builds a handler directly from its parameters (used when writing
    /// test fixtures).
    pub fn new(revision: i64, key_len: usize, o: Vec<u8>, u: Vec<u8>, p: i32, id0: &[u8]) -> Self {
        Self {
            revision,
            key_len,
            o,
            u,
            p,
            id0: id0.to_vec(),
        }
    }

    pub const fn revision(&self) -> i64 {
        self.revision
    }

    pub const fn permissions(&self) -> i32 {
        self.p
    }

    /// Tries `password` as the user password, then as the owner password.
    /// Returns the file key on success.
    pub fn authenticate(&self, password: &[u8]) -> Option<Vec<u8>> {
        self.authenticate_user(password)
            .or_else(|| self.authenticate_owner(password))
    }

    /// Like `authenticate` but with the error a caller should surface.
    pub fn check_password(&self, password: &[u8]) -> Result<Vec<u8>> {
        self.authenticate(password)
            .ok_or(PdfError::Password(PasswordCode::IncorrectPassword))
    }

    fn authenticate_user(&self, password: &[u8]) -> Option<Vec<u8>> {
        let key = compute_file_key(self.revision, self.key_len, password, &self.o, self.p, &self.id0);
        let u = compute_u_value(self.revision, &key, &self.id0);
        let n = if self.revision == 2 { 32 } else { 16 };
        (self.u.len() >= n && u[..n] == self.u[..n]).then_some(key)
    }

    /// Recovers the user password from `O` with the owner key, then checks it.
    fn authenticate_owner(&self, password: &[u8]) -> Option<Vec<u8>> {
        let key = owner_key(self.revision, self.key_len, password);
        let user = if self.revision == 2 {
            rc4(&key, &self.o)
        } else {
            (0..20u8).rev().fold(self.o.clone(), |data, i| {
                rc4(&xor_key(&key, i), &data)
            })
        };
        self.authenticate_user(&user)
    }

    /// Decrypts (or encrypts) `data` belonging to object `objref` with the
    /// per-object key (Algorithm 1).
    pub fn decrypt(&self, file_key: &[u8], objref: ObjRef, data: &[u8]) -> Vec<u8> {
        let mut material = file_key.to_vec();
        material.extend_from_slice(&objref.num.to_le_bytes()[..3]);
        material.extend_from_slice(&objref.generation.to_le_bytes());
        let digest = md5::compute(&material);
        let n = (file_key.len() + 5).min(16);
        rc4(&digest.0[..n], data)
    }
}

fn pad_password(password: &[u8]) -> [u8; 32] {
    let mut padded = PASSWORD_PADDING;
    let len = password.len().min(32);
    padded[..len].copy_from_slice(&password[..len]);
    padded[len..].copy_from_slice(&PASSWORD_PADDING[..32 - len]);
    padded
}

fn xor_key(key: &[u8], i: u8) -> Vec<u8> {
    key.iter().map(|b| b ^ i).collect()
}

/// Algorithm 2: file key from a user password.
pub fn compute_file_key(
    revision: i64,
    key_len: usize,
    password: &[u8],
    o: &[u8],
    p: i32,
    id0: &[u8],
) -> Vec<u8> {
    let mut ctx = md5::Context::new();
    ctx.consume(pad_password(password));
    ctx.consume(o);
    ctx.consume(p.to_le_bytes());
    ctx.consume(id0);
    let mut hash = ctx.finalize().0;
    if revision >= 3 {
        for _ in 0..50 {
            hash = md5::compute(&hash[..key_len]).0;
        }
    }
    hash[..key_len.min(16)].to_vec()
}

/// Algorithms 4 and 5: the `U` entry for `file_key`. For R3 only the first
/// 16 bytes are significant; the rest is filled with padding.
pub fn compute_u_value(revision: i64, file_key: &[u8], id0: &[u8]) -> Vec<u8> {
    if revision == 2 {
        return rc4(file_key, &PASSWORD_PADDING);
    }
    let mut ctx = md5::Context::new();
    ctx.consume(PASSWORD_PADDING);
    ctx.consume(id0);
    let mut out = (0..20u8).fold(ctx.finalize().0.to_vec(), |data, i| {
        rc4(&xor_key(file_key, i), &data)
    });
    out.extend_from_slice(&PASSWORD_PADDING[..16]);
    out
}

fn owner_key(revision: i64, key_len: usize, owner_password: &[u8]) -> Vec<u8> {
    let mut hash = md5::compute(pad_password(owner_password)).0;
    if revision >= 3 {
        for _ in 0..50 {
            hash = md5::compute(hash).0;
        }
    }
    hash[..key_len.min(16)].to_vec()
}

/// Algorithm 3: the `O` entry. An empty owner password falls back to the
/// user password.
pub fn compute_o_value(revision: i64, key_len: usize, owner: &[u8], user: &[u8]) -> Vec<u8> {
    let owner = if owner.is_empty() { user } else { owner };
    let key = owner_key(revision, key_len, owner);
    let first = rc4(&key, &pad_password(user));
    if revision == 2 {
        return first;
    }
    (1..20u8).fold(first, |data, i| rc4(&xor_key(&key, i), &data))
}
