type Release<C> = Box<dyn FnOnce(&mut C)>;

/// A stack of undo actions, one per acquired resource.
///
/// Each action receives the owner's context (`C`) so resources can live in
/// ordinary fields while their release order is recorded here. Unwinding
/// runs the actions newest-first and empties the stack, so a second unwind
/// does nothing.
pub struct ResourceStack<C> {
    entries: Vec<(&'static str, Release<C>)>,
}

impl<C> ResourceStack<C> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Record that `label` was acquired and how to release it.
    pub fn push(&mut self, label: &'static str, release: impl FnOnce(&mut C) + 'static) {
        tracing::trace!(resource = label, "acquired");
        self.entries.push((label, Box::new(release)));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Labels in acquisition order.
    pub fn labels(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|(label, _)| *label)
    }

    /// Release everything in reverse acquisition order.
    pub fn unwind(&mut self, ctx: &mut C) {
        while let Some((label, release)) = self.entries.pop() {
            tracing::debug!(resource = label, "releasing");
            release(ctx);
        }
    }
}

impl<C> Default for ResourceStack<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> core::fmt::Debug for ResourceStack<C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list().entries(self.labels()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unwinds_in_reverse_order() {
        let mut stack: ResourceStack<Vec<&'static str>> = ResourceStack::new();
        stack.push("manager", |log| log.push("manager"));
        stack.push("device", |log| log.push("device"));
        stack.push("session", |log| log.push("session"));
        assert_eq!(stack.labels().collect::<Vec<_>>(), ["manager", "device", "session"]);

        let mut log = Vec::new();
        stack.unwind(&mut log);
        assert_eq!(log, ["session", "device", "manager"]);
        assert!(stack.is_empty());
    }

    #[test]
    fn unwind_is_idempotent() {
        let mut stack: ResourceStack<u32> = ResourceStack::new();
        stack.push("counter", |n| *n += 1);
        let mut n = 0;
        stack.unwind(&mut n);
        stack.unwind(&mut n);
        assert_eq!(n, 1);
    }

    #[test]
    fn partial_setup_releases_only_what_was_acquired() {
        fn setup(stack: &mut ResourceStack<Vec<u8>>, fail_at: u8) -> Result<(), u8> {
            for step in 0..4u8 {
                if step == fail_at {
                    return Err(step);
                }
                stack.push("step", move |log| log.push(step));
            }
            Ok(())
        }

        let mut stack = ResourceStack::new();
        let mut log = Vec::new();
        assert_eq!(setup(&mut stack, 2), Err(2));
        stack.unwind(&mut log);
        assert_eq!(log, [1, 0]);
    }
}
