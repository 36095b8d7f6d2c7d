//! Parley secret comparison
//!
//! Lets two parties find out whether they hold the same secret without
//! revealing it, over any message channel the application provides. The
//! exchange is a fixed four-message socialist-millionaire protocol on
//! the Ristretto group; every transmitted value carries a zero-knowledge
//! proof that is verified before use.
//!
//! ```no_run
//! use parley_compare::{Comparator, CompareError, CompareResult};
//!
//! # fn main() -> Result<(), parley_compare::CompareError> {
//! let mut alice = Comparator::new(b"shared passphrase")?;
//! let mut bob = Comparator::new(b"shared passphrase")?;
//!
//! let m1 = alice.begin()?;
//! let m2 = bob.proceed(&m1)?.ok_or(CompareError::Protocol("no reply".into()))?;
//! let m3 = alice.proceed(&m2)?.ok_or(CompareError::Protocol("no reply".into()))?;
//! let m4 = bob.proceed(&m3)?.ok_or(CompareError::Protocol("no reply".into()))?;
//! alice.proceed(&m4)?;
//!
//! assert_eq!(alice.result(), CompareResult::Match);
//! assert_eq!(bob.result(), CompareResult::Match);
//! # Ok(())
//! # }
//! ```

pub mod compare;
pub mod error;
mod message;
mod proof;

pub use compare::{Comparator, CompareResult};
pub use error::CompareError;
