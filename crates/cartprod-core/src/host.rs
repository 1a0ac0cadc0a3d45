use std::path::PathBuf;

use crate::directive::Directive;
use crate::error::CartResult;

/// A tabular-data engine holding at most one active dataset.
///
/// Every query and directive is answered synchronously; a failed directive
/// aborts whatever sequence it was part of.
pub trait Host {
    /// Name of the active dataset, `None` when it is unnamed.
    fn active_name(&self) -> CartResult<Option<String>>;

    /// Case count of the active dataset, `None` until a data pass has been made.
    fn case_count(&self) -> CartResult<Option<usize>>;

    /// Variables of the active dataset, in dataset order.
    fn variables(&self) -> CartResult<Vec<String>>;

    /// File the active dataset was opened from, if any.
    fn active_file(&self) -> CartResult<Option<PathBuf>>;

    fn has_dataset(&self, name: &str) -> bool;

    fn submit(&mut self, directive: Directive) -> CartResult<()>;

    fn submit_all(&mut self, directives: Vec<Directive>) -> CartResult<()> {
        for directive in directives {
            self.submit(directive)?;
        }
        Ok(())
    }
}
