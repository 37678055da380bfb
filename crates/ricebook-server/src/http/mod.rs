// SPDX-License-Identifier: Apache-2.0

//! Route handlers. One module per resource family, mirroring the path
//! layout in `ricebook_api::endpoints_v1`.

pub(crate) mod articles;
pub(crate) mod following;
pub(crate) mod identity;
pub(crate) mod media;
pub(crate) mod ops;
pub(crate) mod profile;
pub(crate) mod session;
pub(crate) mod support;
