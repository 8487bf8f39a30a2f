use crate::command::Sequence;

/// Previously executed lines, most recent last.
///
/// Lives only as long as the interpreter; nothing is written to disk.
#[derive(Debug, Clone, Default)]
pub struct History {
    entries: Vec<Sequence>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sequence: Sequence) {
        self.entries.push(sequence);
    }

    /// The `n`-th most recent entry; `1` is the latest one. `0` is never valid.
    pub fn get(&self, n: usize) -> Option<&Sequence> {
        let index = self.entries.len().checked_sub(n)?;
        if n == 0 {
            return None;
        }
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
