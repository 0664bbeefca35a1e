#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
//! Battery charger state machine library.
//!
//! Implements the input-path control logic of a switch-mode battery charger:
//! a votable arbiter for contended hardware controls, the Type-C/BC1.2/QC/PD
//! charger detection state machine, and the protection loops around it.
//!
//! The library is hardware-agnostic. It talks to the charger block through
//! the [`smbchg_traits::Transport`] register bus and to the host environment
//! through [`smbchg_traits::Platform`].

#[macro_use]
mod fmt;

pub mod charger;
pub mod config;
pub mod counters;
pub mod events;
pub mod regs;
pub mod storm;
pub mod timers;
pub mod votable;
pub mod work;

#[cfg(test)]
mod dummy;
