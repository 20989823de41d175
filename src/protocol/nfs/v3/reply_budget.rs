//! Byte budgeting for READDIR and READDIRPLUS replies.
//!
//! Those two procedures cap the reply by a client-supplied byte count, not
//! an entry count, so the handlers serialize one entry at a time and commit
//! it only while the reply still fits. [`BudgetedWriter`] wraps the reply
//! writer with the running total and answers the fit-or-truncate question
//! before each entry is committed.

use std::io::Write;

/// A reply writer that tracks its size against a byte budget.
pub struct BudgetedWriter<W> {
    inner: W,
    written: usize,
    budget: usize,
}

impl<W> BudgetedWriter<W>
where
    W: Write,
{
    /// Wraps `inner` with a fresh count against `budget` bytes.
    pub fn new(inner: W, budget: usize) -> Self {
        BudgetedWriter { inner, written: 0, budget }
    }

    /// True when `more` further bytes still fit under the budget.
    pub fn fits(&self, more: usize) -> bool {
        self.written + more < self.budget
    }

    /// Bytes committed to the reply so far.
    pub fn bytes_written(&self) -> usize {
        self.written
    }
}

impl<W> Write for BudgetedWriter<W>
where
    W: Write,
{
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.written += written;
        Ok(written)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}
