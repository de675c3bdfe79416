use std::time::Instant;

use metrics::{counter, histogram};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tonic::{Code, Request, Response, Status, Streaming};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::config::StreamSettings;
use super::state::CatalogState;
use crate::auth::Claims;
use crate::filter::{is_qualified, validate_filter};
use crate::proto::laptop_service_server::LaptopService;
use crate::proto::upload_image_request::Data;
use crate::proto::{
    CreateLaptopRequest, CreateLaptopResponse, Filter, RateLaptopRequest, RateLaptopResponse,
    SearchLaptopRequest, SearchLaptopResponse, UploadImageRequest, UploadImageResponse,
};
use crate::store::{canonical_id, LaptopStore, SearchOutcome, StoredImage};
use crate::{Error, Result};

/// Lowest accepted rating score.
pub const MIN_SCORE: f64 = 1.0;
/// Highest accepted rating score.
pub const MAX_SCORE: f64 = 10.0;

/// gRPC service implementation for the laptop catalog.
pub struct LaptopServiceImpl {
    state: CatalogState,
    limits: StreamSettings,
}

impl LaptopServiceImpl {
    /// Creates a new catalog service over the given stores.
    pub fn new(state: CatalogState, limits: StreamSettings) -> Self {
        Self { state, limits }
    }

    async fn create(&self, request: CreateLaptopRequest, caller: &str) -> Result<String> {
        let mut laptop = request
            .laptop
            .ok_or_else(|| Error::InvalidArgument("request carries no laptop".to_string()))?;

        laptop.id = if laptop.id.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            canonical_id(&laptop.id)?
        };

        let id = laptop.id.clone();
        self.state.laptops.save(laptop).await?;

        info!(laptop_id = %id, %caller, "saved laptop");
        Ok(id)
    }

    async fn receive_image(&self, mut stream: Streaming<UploadImageRequest>) -> Result<StoredImage> {
        let deadline = tokio::time::Instant::now() + self.limits.upload_deadline();

        let info = match next_chunk(&mut stream, deadline).await? {
            Some(UploadImageRequest {
                data: Some(Data::Info(info)),
            }) => info,
            Some(_) => {
                return Err(Error::InvalidArgument(
                    "first upload message must carry image info".to_string(),
                ))
            }
            None => {
                return Err(Error::InvalidArgument(
                    "upload ended before image info was sent".to_string(),
                ))
            }
        };

        let laptop_id = stored_laptop_id(&self.state, &info.laptop_id).await?;

        let mut session = self.state.images.begin(&laptop_id, &info.image_type)?;
        debug!(%laptop_id, image_type = %info.image_type, "receiving image");

        while let Some(message) = next_chunk(&mut stream, deadline).await? {
            match message.data {
                Some(Data::ChunkData(chunk)) => session.append(&chunk)?,
                Some(Data::Info(_)) => {
                    return Err(Error::InvalidArgument(
                        "image info may only be sent once".to_string(),
                    ))
                }
                None => {
                    return Err(Error::InvalidArgument(
                        "upload message carries no data".to_string(),
                    ))
                }
            }
        }

        session.finalize().await
    }
}

async fn next_chunk(
    stream: &mut Streaming<UploadImageRequest>,
    deadline: tokio::time::Instant,
) -> Result<Option<UploadImageRequest>> {
    match tokio::time::timeout_at(deadline, stream.message()).await {
        Ok(Ok(message)) => Ok(message),
        Ok(Err(status)) => Err(transport_error(&status)),
        Err(_) => Err(Error::DeadlineExceeded(
            "image upload took too long".to_string(),
        )),
    }
}

fn transport_error(status: &Status) -> Error {
    match status.code() {
        Code::Cancelled => Error::Canceled("client canceled the call".to_string()),
        Code::DeadlineExceeded => Error::DeadlineExceeded(status.message().to_string()),
        _ => Error::Internal(format!("cannot receive message: {}", status.message())),
    }
}

/// Canonical id of a stored laptop, or `NotFound`.
async fn stored_laptop_id(state: &CatalogState, id: &str) -> Result<String> {
    match canonical_id(id) {
        Ok(key) if state.laptops.contains(&key).await => Ok(key),
        _ => Err(Error::NotFound(format!("laptop '{id}' not found"))),
    }
}

fn validate_score(score: f64) -> Result<()> {
    if !score.is_finite() || !(MIN_SCORE..=MAX_SCORE).contains(&score) {
        return Err(Error::InvalidArgument(format!(
            "score {score} must be between {MIN_SCORE} and {MAX_SCORE}"
        )));
    }
    Ok(())
}

async fn rate(state: &CatalogState, request: RateLaptopRequest) -> Result<RateLaptopResponse> {
    validate_score(request.score)?;

    let laptop_id = stored_laptop_id(state, &request.laptop_id).await?;

    let rating = state.ratings.add(&laptop_id, request.score)?;
    info!(
        %laptop_id,
        count = rating.count,
        average = rating.average(),
        "rated laptop"
    );

    Ok(RateLaptopResponse {
        laptop_id,
        rated_count: rating.count,
        average_score: rating.average(),
    })
}

/// A search running in the background.
pub struct SearchTask {
    /// Matching laptops, ending with `DEADLINE_EXCEEDED` when the deadline
    /// cuts the scan short.
    pub responses: mpsc::Receiver<std::result::Result<SearchLaptopResponse, Status>>,
    /// Resolves to how the scan ended.
    pub scan: JoinHandle<Result<SearchOutcome>>,
}

/// Scans `laptops` for matches of `filter` on a background task.
///
/// Results are pushed into a channel of `limits.buffer` entries. The scan is
/// canceled when the receiver is dropped or the search deadline passes, even
/// while it waits for room in the channel.
pub fn spawn_search(laptops: LaptopStore, filter: Filter, limits: &StreamSettings) -> SearchTask {
    let (tx, rx) = mpsc::channel(limits.buffer);
    let cancel = CancellationToken::new();

    let watch_tx = tx.clone();
    let watch_cancel = cancel.clone();
    let deadline = limits.search_deadline();
    tokio::spawn(async move {
        tokio::select! {
            _ = watch_cancel.cancelled() => {}
            _ = watch_tx.closed() => {
                debug!("search client went away");
                watch_cancel.cancel();
            }
            _ = tokio::time::sleep(deadline) => {
                watch_cancel.cancel();
                let _ = watch_tx
                    .send(Err(Status::deadline_exceeded("search deadline exceeded")))
                    .await;
            }
        }
    });

    let scan = tokio::spawn(async move {
        let _done = cancel.clone().drop_guard();
        let start = Instant::now();

        let outcome = laptops
            .search(
                &cancel,
                |laptop| is_qualified(&filter, laptop),
                |laptop| {
                    let tx = tx.clone();
                    let cancel = cancel.clone();
                    async move {
                        debug!(laptop_id = %laptop.id, "found matching laptop");
                        let response = Ok(SearchLaptopResponse {
                            laptop: Some(laptop),
                        });

                        // The scan notices the token before its next entry.
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => {}
                            sent = tx.send(response) => {
                                if sent.is_err() {
                                    cancel.cancel();
                                }
                            }
                        }
                        Ok::<(), Error>(())
                    }
                },
            )
            .await;

        histogram!("catalog.search_laptop.duration").record(start.elapsed().as_secs_f64());

        match &outcome {
            Ok(SearchOutcome::Completed { matched }) => {
                counter!("catalog.search_laptop.success").increment(1);
                info!(matched = *matched, "search completed");
            }
            Ok(SearchOutcome::Canceled { matched }) => {
                counter!("catalog.search_laptop.failure").increment(1);
                info!(matched = *matched, "search canceled");
            }
            Err(e) => {
                counter!("catalog.search_laptop.failure").increment(1);
                debug!(error = %e, "search stopped");
            }
        }

        outcome
    });

    SearchTask {
        responses: rx,
        scan,
    }
}

#[tonic::async_trait]
impl LaptopService for LaptopServiceImpl {
    async fn create_laptop(
        &self,
        request: Request<CreateLaptopRequest>,
    ) -> std::result::Result<Response<CreateLaptopResponse>, Status> {
        let start = Instant::now();
        counter!("catalog.create_laptop.requests").increment(1);

        let caller = request
            .extensions()
            .get::<Claims>()
            .map(|claims| claims.sub.clone())
            .unwrap_or_default();
        let result = self.create(request.into_inner(), &caller).await;

        histogram!("catalog.create_laptop.duration").record(start.elapsed().as_secs_f64());

        match result {
            Ok(id) => {
                counter!("catalog.create_laptop.success").increment(1);
                Ok(Response::new(CreateLaptopResponse { id }))
            }
            Err(e) => {
                counter!("catalog.create_laptop.failure").increment(1);
                warn!(error = %e, "cannot create laptop");
                Err(e.into())
            }
        }
    }

    type SearchLaptopStream = ReceiverStream<std::result::Result<SearchLaptopResponse, Status>>;

    async fn search_laptop(
        &self,
        request: Request<SearchLaptopRequest>,
    ) -> std::result::Result<Response<Self::SearchLaptopStream>, Status> {
        counter!("catalog.search_laptop.requests").increment(1);

        let filter = request.into_inner().filter.unwrap_or_default();
        if let Err(e) = validate_filter(&filter) {
            counter!("catalog.search_laptop.failure").increment(1);
            return Err(e.into());
        }

        let search = spawn_search(self.state.laptops.clone(), filter, &self.limits);
        Ok(Response::new(ReceiverStream::new(search.responses)))
    }

    async fn upload_image(
        &self,
        request: Request<Streaming<UploadImageRequest>>,
    ) -> std::result::Result<Response<UploadImageResponse>, Status> {
        let start = Instant::now();
        counter!("catalog.upload_image.requests").increment(1);

        let result = self.receive_image(request.into_inner()).await;

        histogram!("catalog.upload_image.duration").record(start.elapsed().as_secs_f64());

        match result {
            Ok(image) => {
                counter!("catalog.upload_image.success").increment(1);
                info!(
                    image_id = %image.id,
                    laptop_id = %image.laptop_id,
                    size = image.size,
                    "saved image"
                );
                Ok(Response::new(UploadImageResponse {
                    id: image.id,
                    size: image.size,
                }))
            }
            Err(e) => {
                counter!("catalog.upload_image.failure").increment(1);
                warn!(error = %e, "cannot upload image");
                Err(e.into())
            }
        }
    }

    type RateLaptopStream = ReceiverStream<std::result::Result<RateLaptopResponse, Status>>;

    async fn rate_laptop(
        &self,
        request: Request<Streaming<RateLaptopRequest>>,
    ) -> std::result::Result<Response<Self::RateLaptopStream>, Status> {
        counter!("catalog.rate_laptop.requests").increment(1);

        let mut stream = request.into_inner();
        let (tx, rx) = mpsc::channel(self.limits.buffer);
        let state = self.state.clone();

        tokio::spawn(async move {
            loop {
                let request = match stream.message().await {
                    Ok(Some(request)) => request,
                    Ok(None) => break,
                    Err(status) => {
                        debug!(%status, "rating stream closed");
                        break;
                    }
                };

                let reply = match rate(&state, request).await {
                    Ok(reply) => {
                        counter!("catalog.rate_laptop.success").increment(1);
                        Ok(reply)
                    }
                    Err(e) => {
                        counter!("catalog.rate_laptop.failure").increment(1);
                        warn!(error = %e, "cannot rate laptop");
                        Err(Status::from(e))
                    }
                };

                let failed = reply.is_err();
                if tx.send(reply).await.is_err() || failed {
                    break;
                }
            }
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }
}
