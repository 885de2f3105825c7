//! Corruption guard stamped into every header.
//!
//! The token is a cheap tripwire for writes that ran past the end of a block
//! and into the next header. It catches any overwrite that changes the token;
//! an overwrite that happens to leave it intact goes unnoticed.

use crate::{
  block::Block,
  error::{FatalError, fatal},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct GuardToken(u64);

impl GuardToken {
  pub fn random() -> Self {
    Self(rand::random())
  }

  pub const fn from_raw(value: u64) -> Self {
    Self(value)
  }

  pub const fn get(self) -> u64 {
    self.0
  }

  /// Returns `block` if its header carries this token, aborts otherwise.
  pub fn verify(
    self,
    block: Block,
  ) -> Block {
    if block.guard() != self {
      fatal(FatalError::CorruptedMetadata { addr: block.addr() });
    }
    block
  }

  pub fn verify_opt(
    self,
    block: Option<Block>,
  ) -> Option<Block> {
    block.map(|b| self.verify(b))
  }
}
