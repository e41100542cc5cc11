/*
    chronos-core
    https://github.com/dbalsom/chronos-backup

    Copyright 2026 Daniel Balsom

    Permission is hereby granted, free of charge, to any person obtaining a
    copy of this software and associated documentation files (the “Software”),
    to deal in the Software without restriction, including without limitation
    the rights to use, copy, modify, merge, publish, distribute, sublicense,
    and/or sell copies of the Software, and to permit persons to whom the
    Software is furnished to do so, subject to the following conditions:

    The above copyright notice and this permission notice shall be included in
    all copies or substantial portions of the Software.

    THE SOFTWARE IS PROVIDED “AS IS”, WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
    IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
    FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
    AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
    LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
    FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
    DEALINGS IN THE SOFTWARE.

    --------------------------------------------------------------------------
*/
use chronos_core::progress::{OperationProgress, ProgressReporter};

/// Prints each [`OperationProgress`] event on a single overwritten line.
/// Silent when `quiet` is set, matching `GlobalOptions::quiet`.
pub(crate) struct CliProgressReporter {
    pub quiet: bool,
}

impl ProgressReporter for CliProgressReporter {
    fn report(&self, progress: OperationProgress) {
        if self.quiet {
            return;
        }
        eprint!(
            "\r{:<12} {:>6.1}%  {:>10}/{:<10}  {:>8.2} MB/s",
            progress.status_message,
            progress.percent,
            progress.bytes_done,
            progress.bytes_total,
            progress.bytes_per_second / (1024.0 * 1024.0),
        );
        if progress.percent >= 100.0 {
            eprintln!();
        }
    }
}
