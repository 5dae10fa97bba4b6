use core::fmt;

/// The reason a tree operation refused its input.
#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The tree already holds an element with an equal key.
    #[error("an element with an equal key is already in the tree")]
    DuplicateKey,

    /// The separator of a join does not lie strictly between the keys of the two trees.
    #[error("join separator does not lie strictly between the keys of the two trees")]
    UnorderedJoin,
}

/// A refused operation.
///
/// Operations that take ownership of their input hand it back through `payload` when they fail,
/// leaving every tree involved unchanged.
pub struct Rejected<P> {
    pub error: Error,
    pub payload: P,
}

impl<P> Rejected<P> {
    pub(crate) fn new(error: Error, payload: P) -> Self {
        Rejected { error, payload }
    }

    /// Maps the returned payload, keeping the error.
    pub fn map<F, R>(self, f: F) -> Rejected<R>
    where
        F: FnOnce(P) -> R,
    {
        Rejected {
            error: self.error,
            payload: f(self.payload),
        }
    }

    /// Returns the rejected input.
    pub fn into_payload(self) -> P {
        self.payload
    }
}

impl<P> fmt::Debug for Rejected<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rejected")
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

impl<P> fmt::Display for Rejected<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.error, f)
    }
}

impl<P> std::error::Error for Rejected<P> {}
