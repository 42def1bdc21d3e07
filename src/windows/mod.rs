//! Simulator shared memory access
//!
//! The simulator exposes three named, memory-mapped pages (physics, graphics
//! and static). [`PhysicsPage`], [`GraphicsPage`] and [`StaticPage`] declare the
//! `#[repr(C)]` prefix of each page and how it converts into the crate's
//! snapshot types; that part is plain data and is available on every
//! platform. Mapping the pages needs the Win32 API and only exists on Windows.
//!
//! # Usage
//!
//! ```rust,ignore
//! use stint::windows::{PageMapping, PhysicsPage, PHYSICS_PAGE_NAME};
//!
//! let page = PageMapping::<PhysicsPage>::open(PHYSICS_PAGE_NAME)?;
//! let physics: stint::PhysicsSnapshot = (&page.read()).into();
//! ```

#[cfg(windows)]
mod connection;
mod pages;

#[cfg(windows)]
pub use connection::{GRAPHICS_PAGE_NAME, PHYSICS_PAGE_NAME, PageMapping, STATIC_PAGE_NAME};
pub use pages::{GraphicsPage, PhysicsPage, StaticPage, decode_wide};
