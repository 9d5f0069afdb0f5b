use crate::bytecode::Op;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Leading bytes of a serialized program image.
pub const MAGIC: &[u8; 4] = b"QLBC";

/// Bumped whenever `Op` changes shape.
pub const FORMAT_VERSION: u8 = 1;

/// A compiled bytecode program.
///
/// A single flat instruction stream: the top-level code and every function
/// body live in `ops`, and an instruction's index is its address.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgramBc {
    pub ops: Vec<Op>,
}

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("not a quill bytecode image (bad magic)")]
    BadMagic,

    #[error("unsupported bytecode format version {found} (expected {expected})")]
    UnsupportedVersion { found: u8, expected: u8 },

    #[error("malformed bytecode image: {0}")]
    Decode(#[from] postcard::Error),
}

impl ProgramBc {
    pub fn new(ops: Vec<Op>) -> Self {
        Self { ops }
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Encodes the program as `MAGIC`, version byte, postcard payload.
    pub fn to_bytes(&self) -> Result<Vec<u8>, FormatError> {
        let mut out = Vec::with_capacity(self.ops.len() * 4 + 5);
        out.extend_from_slice(MAGIC);
        out.push(FORMAT_VERSION);
        let payload = postcard::to_allocvec(self)?;
        out.extend_from_slice(&payload);
        Ok(out)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FormatError> {
        let rest = bytes.strip_prefix(MAGIC.as_slice()).ok_or(FormatError::BadMagic)?;
        let (&version, payload) = rest.split_first().ok_or(FormatError::BadMagic)?;
        if version != FORMAT_VERSION {
            return Err(FormatError::UnsupportedVersion {
                found: version,
                expected: FORMAT_VERSION,
            });
        }
        Ok(postcard::from_bytes(payload)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::op::Constant;
    use crate::lang::node::BinaryOp;

    fn sample() -> ProgramBc {
        ProgramBc::new(vec![
            Op::Push(Constant::Number(2.5)),
            Op::Push(Constant::Name("a".to_string())),
            Op::Push(Constant::Address(7)),
            Op::Binary(BinaryOp::Le),
            Op::JumpIfFalse(-3),
            Op::CallUser(2),
            Op::Return,
        ])
    }

    #[test]
    fn test_image_starts_with_magic_and_version() {
        let bytes = sample().to_bytes().unwrap();
        assert_eq!(&bytes[..4], MAGIC);
        assert_eq!(bytes[4], FORMAT_VERSION);
        assert_eq!(ProgramBc::from_bytes(&bytes).unwrap(), sample());
    }

    #[test]
    fn test_rejects_foreign_bytes() {
        assert!(matches!(
            ProgramBc::from_bytes(b"\x7fELF...."),
            Err(FormatError::BadMagic)
        ));
        assert!(matches!(ProgramBc::from_bytes(b"QLBC"), Err(FormatError::BadMagic)));
    }

    #[test]
    fn test_rejects_other_version() {
        let mut bytes = sample().to_bytes().unwrap();
        bytes[4] = FORMAT_VERSION + 1;
        assert!(matches!(
            ProgramBc::from_bytes(&bytes),
            Err(FormatError::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn test_rejects_truncated_payload() {
        let bytes = sample().to_bytes().unwrap();
        let cut = &bytes[..bytes.len() - 2];
        assert!(matches!(ProgramBc::from_bytes(cut), Err(FormatError::Decode(_))));
    }
}
