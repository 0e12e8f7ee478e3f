/*! Pass-scoped scratch memory.
 *
 * Analyses need short-lived dense arrays (DFS numbers, semidominators, dependency counts) whose
 * lifetime ends with the pass. The local arena is a bump region of 32-bit words: allocation
 * appends, and the pass manager rewinds to the mark it took before the pass started.
 */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    start: u32,
    len: u32,
}

impl Span {
    pub fn len(self) -> usize {
        self.len as usize
    }

    pub fn is_empty(self) -> bool {
        self.len == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaMark(usize);

#[derive(Debug, Default)]
pub struct LocalArena {
    words: Vec<u32>,
    top: usize,
    peak: usize,
}

impl LocalArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, len: usize, fill: u32) -> Span {
        let start = self.top;
        let end = start + len;
        if self.words.len() < end {
            self.words.resize(end, 0);
        }
        self.words[start..end].fill(fill);
        self.top = end;
        self.peak = self.peak.max(end);
        Span {
            start: start as u32,
            len: len as u32,
        }
    }

    pub fn get(&self, span: Span, index: usize) -> u32 {
        debug_assert!(index < span.len(), "arena index {} out of span", index);
        debug_assert!(span.start as usize + span.len() <= self.top, "span outlived its mark");
        self.words[span.start as usize + index]
    }

    pub fn set(&mut self, span: Span, index: usize, value: u32) {
        debug_assert!(index < span.len(), "arena index {} out of span", index);
        debug_assert!(span.start as usize + span.len() <= self.top, "span outlived its mark");
        self.words[span.start as usize + index] = value;
    }

    pub fn slice(&self, span: Span) -> &[u32] {
        &self.words[span.start as usize..span.start as usize + span.len()]
    }

    pub fn mark(&self) -> ArenaMark {
        ArenaMark(self.top)
    }

    pub fn reset_to(&mut self, mark: ArenaMark) {
        debug_assert!(mark.0 <= self.top, "resetting arena forward");
        self.top = mark.0;
    }

    /// Bytes currently handed out.
    pub fn allocated_size(&self) -> usize {
        self.top * std::mem::size_of::<u32>()
    }

    pub fn peak_size(&self) -> usize {
        self.peak * std::mem::size_of::<u32>()
    }

    pub fn reset_peak(&mut self) {
        self.peak = self.top;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_and_reset() {
        let mut arena = LocalArena::new();
        let mark = arena.mark();

        let a = arena.alloc(4, 7);
        let b = arena.alloc(2, 0);
        arena.set(b, 1, 42);
        assert_eq!(arena.slice(a), &[7, 7, 7, 7]);
        assert_eq!(arena.get(b, 1), 42);
        assert_eq!(arena.allocated_size(), 24);

        arena.reset_to(mark);
        assert_eq!(arena.allocated_size(), 0);
        assert_eq!(arena.peak_size(), 24);

        let c = arena.alloc(3, 1);
        assert_eq!(arena.slice(c), &[1, 1, 1]);
    }
}
