//! Template front end
//!
//! Template text is markup interleaved with `@` transitions into host code.
//! The scanner turns it into a [`Document`]: the directives it declares and a
//! tree of [`Region`]s that the program generator walks.
//!
//! # Example
//!
//! ```text
//! @using Site
//! <ul>
//! @foreach (var item in Model.Items)
//! {
//!     <li class="@item.Kind">@item.Name</li>
//! }
//! </ul>
//! ```

mod region;
mod scanner;

pub use region::{AttributePart, AttributeRegion, AttributeValue, Document, Region};
pub use scanner::scan;
