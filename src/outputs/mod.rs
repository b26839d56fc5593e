//! Output generation for composed bulletins.
//!
//! - [`html`]: renders the selected articles as a standalone HTML page,
//!   written to stdout by the `compose` command

pub mod html;
