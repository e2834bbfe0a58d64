//! Draining iterator over a session's pending display commands.

use std::collections::vec_deque::Drain;
use std::iter::FusedIterator;

use crate::DisplayCommand;

/// A zero-allocation opaque iterator that drains pending display commands
/// from a session.
///
/// This type wraps the internal command queue drain, providing a stable
/// public API that doesn't expose `std::collections::vec_deque::Drain`
/// directly. It implements [`Iterator`], [`DoubleEndedIterator`],
/// [`ExactSizeIterator`], and [`FusedIterator`].
///
/// Obtain a `CommandDrain` by calling
/// [`TurnSession::display_commands()`](crate::TurnSession::display_commands).
///
/// # Examples
///
/// ```ignore
/// for command in session.display_commands() {
///     match command {
///         DisplayCommand::SetPlayerCount(count) => display.set_scalar("playerCount", count),
///         _ => { /* handle other commands */ }
///     }
/// }
/// ```
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct CommandDrain<'a> {
    inner: Drain<'a, DisplayCommand>,
}

impl<'a> CommandDrain<'a> {
    pub(crate) fn from_drain(drain: Drain<'a, DisplayCommand>) -> Self {
        Self { inner: drain }
    }
}

impl Iterator for CommandDrain<'_> {
    type Item = DisplayCommand;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl DoubleEndedIterator for CommandDrain<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back()
    }
}

impl ExactSizeIterator for CommandDrain<'_> {
    fn len(&self) -> usize {
        self.inner.len()
    }
}

impl FusedIterator for CommandDrain<'_> {}

impl std::fmt::Debug for CommandDrain<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandDrain")
            .field("remaining", &self.len())
            .finish()
    }
}

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::iter_with_drain
)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    fn queue_of(values: &[i64]) -> VecDeque<DisplayCommand> {
        values
            .iter()
            .map(|v| DisplayCommand::SetPlayerCount(*v))
            .collect()
    }

    #[test]
    fn drain_yields_all_commands_in_order() {
        let mut queue = queue_of(&[1, 2, 3]);
        let drain = CommandDrain::from_drain(queue.drain(..));
        let commands: Vec<_> = drain.collect();
        assert_eq!(
            commands,
            vec![
                DisplayCommand::SetPlayerCount(1),
                DisplayCommand::SetPlayerCount(2),
                DisplayCommand::SetPlayerCount(3),
            ]
        );
    }

    #[test]
    fn drain_is_fused() {
        let mut queue = queue_of(&[1]);
        let mut drain = CommandDrain::from_drain(queue.drain(..));
        assert!(drain.next().is_some());
        assert!(drain.next().is_none());
        assert!(drain.next().is_none());
    }

    #[test]
    fn double_ended_iteration() {
        let mut queue = queue_of(&[1, 2, 3]);
        let mut drain = CommandDrain::from_drain(queue.drain(..));
        assert_eq!(drain.next_back(), Some(DisplayCommand::SetPlayerCount(3)));
        assert_eq!(drain.next(), Some(DisplayCommand::SetPlayerCount(1)));
        assert_eq!(drain.next_back(), Some(DisplayCommand::SetPlayerCount(2)));
        assert!(drain.next().is_none());
    }

    #[test]
    fn exact_size_is_accurate() {
        let mut queue = queue_of(&[1, 2]);
        let mut drain = CommandDrain::from_drain(queue.drain(..));
        assert_eq!(drain.len(), 2);
        let _ = drain.next();
        assert_eq!(drain.len(), 1);
        let _ = drain.next();
        assert_eq!(drain.len(), 0);
    }

    #[test]
    fn debug_format_shows_remaining_count() {
        let mut queue = queue_of(&[1, 2]);
        let drain = CommandDrain::from_drain(queue.drain(..));
        assert_eq!(format!("{drain:?}"), "CommandDrain { remaining: 2 }");
    }

    #[test]
    fn size_hint_matches_len() {
        let mut queue = queue_of(&[1, 2, 3]);
        let drain = CommandDrain::from_drain(queue.drain(..));
        assert_eq!(drain.size_hint(), (3, Some(3)));
    }
}
