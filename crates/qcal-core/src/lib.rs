//! qcal core model
//!
//! Types shared by every qcal crate:
//!
//! - [`PhysicalElement`]: a qubit (`q06`) or a coupler (`q06_q07`)
//! - [`Samplespace`]: settable quantity → element → ordered sweep values
//!
//! A calibration node carries two samplespaces. The *schedule* samplespace is
//! swept inside one compiled program; the *external* samplespace needs one
//! hardware execution per value and is consumed one slice at a time via
//! [`Samplespace::slice`].
//!
//! ```rust
//! use qcal_core::{PhysicalElement, Samplespace, SettableQuantity, linspace};
//!
//! let q00 = PhysicalElement::qubit("q00");
//! let space = Samplespace::new()
//!     .with_quantity(
//!         SettableQuantity::new("ro_amplitudes", "V").with_values(q00.clone(), linspace(0.1, 0.3, 3)),
//!     )
//!     .unwrap();
//!
//! assert_eq!(space.sweep_dimension().unwrap(), 3);
//! assert!(space.slice(0).unwrap().is_reduced());
//! ```

pub mod element;
pub mod error;
pub mod samplespace;

pub use element::{COUPLER_SEPARATOR, PhysicalElement};
pub use error::{SamplespaceError, SamplespaceResult};
pub use samplespace::{Samplespace, SettableQuantity, linspace};
