// SPDX-License-Identifier: Apache-2.0

pub(crate) mod google;
pub(crate) mod password;
pub(crate) mod session;

pub use session::{SessionIdentity, SessionStore};
