use crate::downloader::test_helpers::{
    Behavior, RecordingSink, create_test_downloader, create_test_downloader_with_sink, url,
    wait_for_event,
};
use crate::error::{DownloadError, Error, FailureKind, FetchError, Rejection};
use crate::types::{
    ArtifactRemoval, Event, RequestId, RequestResult, RequestState, Submission, UserId,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

mod worker;

fn rejection(err: Error) -> Rejection {
    match err {
        Error::Rejected(r) => r,
        other => panic!("expected a rejection, got {other:?}"),
    }
}
