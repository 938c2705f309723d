use thiserror::Error;

use trie_source::SourceError;

/// Everything that can fail a traversal: a node fetch, an observed
/// cancellation token, or a source failing to close once the traversal is
/// done with it.
#[derive(Debug, Error)]
pub enum VisitorError {
    #[error(transparent)]
    Fetch(#[from] SourceError),
    #[error("traversal cancelled")]
    Cancelled,
    #[error("failed to close a node source: {0}")]
    CloseFailed(SourceError),
    #[error("{original} (close also failed: {close})")]
    Closing {
        #[source]
        original: Box<VisitorError>,
        close: SourceError,
    },
}

impl VisitorError {
    /// Joins a close-time failure onto whatever the traversal itself
    /// produced: a clean close never changes the outcome, a close failure
    /// on an otherwise clean run becomes the result, and a close failure
    /// alongside an existing error is attached to it rather than dropped.
    pub fn join_close<T>(
        outcome: Result<T, VisitorError>,
        close: Result<(), SourceError>,
    ) -> Result<T, VisitorError> {
        match (outcome, close) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(close_err)) => Err(VisitorError::CloseFailed(close_err)),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(close_err)) => Err(VisitorError::Closing {
                original: Box::new(e),
                close: close_err,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn io_err() -> SourceError {
        SourceError::Io {
            path: "values.dat".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        }
    }

    #[test]
    fn a_clean_close_does_not_disturb_a_successful_outcome() {
        let result = VisitorError::join_close(Ok(7), Ok(()));
        assert_eq!(result.unwrap(), 7);
    }

    #[test]
    fn a_close_failure_on_an_otherwise_clean_run_surfaces_as_close_failed() {
        let result = VisitorError::join_close(Ok(()), Err(io_err()));
        assert!(matches!(result, Err(VisitorError::CloseFailed(_))));
    }

    #[test]
    fn a_clean_close_does_not_mask_an_existing_error() {
        let result: Result<(), VisitorError> =
            VisitorError::join_close(Err(VisitorError::Cancelled), Ok(()));
        assert!(matches!(result, Err(VisitorError::Cancelled)));
    }

    #[test]
    fn both_failing_joins_the_close_error_onto_the_original() {
        let result: Result<(), VisitorError> =
            VisitorError::join_close(Err(VisitorError::Cancelled), Err(io_err()));
        match result {
            Err(VisitorError::Closing { original, close: _ }) => {
                assert!(matches!(*original, VisitorError::Cancelled));
            }
            other => panic!("expected Closing, got {other:?}"),
        }
    }
}
