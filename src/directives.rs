//! Directive injection
//!
//! Prepends the configured base type and default imports to raw template
//! text, so the template front end sees them as if the author had written
//! them. A malformed base type name is not checked here; it surfaces as a
//! compile diagnostic.

use crate::options::CompilationOptions;

/// Prefix `template` with an `@inherits` line and one `@using` line per
/// default import, in insertion order
pub fn inject(template: &str, options: &CompilationOptions) -> String {
    let mut out = String::with_capacity(template.len() + 64);

    out.push_str("@inherits ");
    out.push_str(options.inherits());
    out.push('\n');

    for import in options.default_imports() {
        out.push_str("@using ");
        out.push_str(import);
        out.push('\n');
    }

    out.push_str(template);
    out
}
