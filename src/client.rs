use tonic::metadata::{Ascii, MetadataValue};
use tonic::service::interceptor::InterceptedService;
use tonic::service::Interceptor;
use tonic::transport::Channel;
use tonic::{Request, Status};
use tracing::debug;

use crate::auth::interceptor::AUTHORIZATION_HEADER;
use crate::proto::auth_service_client::AuthServiceClient;
use crate::proto::laptop_service_client::LaptopServiceClient;
use crate::proto::upload_image_request::Data;
use crate::proto::{
    CreateLaptopRequest, Filter, ImageInfo, Laptop, LoginRequest, RateLaptopRequest,
    RateLaptopResponse, SearchLaptopRequest, UploadImageRequest, UploadImageResponse,
};
use crate::{Error, Result};

/// Bytes sent per upload message.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Attaches `authorization: Bearer <token>` to every outgoing call.
#[derive(Clone, Debug, Default)]
pub struct AuthInterceptor {
    token: Option<MetadataValue<Ascii>>,
}

impl AuthInterceptor {
    /// Interceptor presenting `access_token`.
    pub fn new(access_token: &str) -> Result<Self> {
        let value = format!("Bearer {access_token}")
            .parse()
            .map_err(|_| Error::InvalidArgument("access token is not ASCII".to_string()))?;

        Ok(Self { token: Some(value) })
    }

    /// Interceptor that sends no credentials.
    pub fn anonymous() -> Self {
        Self::default()
    }
}

impl Interceptor for AuthInterceptor {
    fn call(&mut self, mut request: Request<()>) -> std::result::Result<Request<()>, Status> {
        if let Some(token) = &self.token {
            request
                .metadata_mut()
                .insert(AUTHORIZATION_HEADER, token.clone());
        }
        Ok(request)
    }
}

/// Exchanges a username/password pair for an access token.
pub async fn login(
    channel: Channel,
    username: &str,
    password: &str,
) -> std::result::Result<String, Status> {
    let response = AuthServiceClient::new(channel)
        .login(LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        })
        .await?;

    Ok(response.into_inner().access_token)
}

/// Laptop service client carrying a bearer token.
#[derive(Clone)]
pub struct CatalogClient {
    inner: LaptopServiceClient<InterceptedService<Channel, AuthInterceptor>>,
}

impl CatalogClient {
    /// Creates a client sending calls over `channel` with `interceptor`'s credentials.
    pub fn new(channel: Channel, interceptor: AuthInterceptor) -> Self {
        Self {
            inner: LaptopServiceClient::with_interceptor(channel, interceptor),
        }
    }

    /// Stores `laptop` and returns its id.
    pub async fn create_laptop(&mut self, laptop: Laptop) -> std::result::Result<String, Status> {
        let response = self
            .inner
            .create_laptop(CreateLaptopRequest {
                laptop: Some(laptop),
            })
            .await?;

        Ok(response.into_inner().id)
    }

    /// Collects every laptop matching `filter`.
    pub async fn search(&mut self, filter: Filter) -> std::result::Result<Vec<Laptop>, Status> {
        let mut stream = self
            .inner
            .search_laptop(SearchLaptopRequest {
                filter: Some(filter),
            })
            .await?
            .into_inner();

        let mut laptops = Vec::new();
        while let Some(response) = stream.message().await? {
            if let Some(laptop) = response.laptop {
                debug!(laptop_id = %laptop.id, "found laptop");
                laptops.push(laptop);
            }
        }
        Ok(laptops)
    }

    /// Uploads `data` as an image of `laptop_id`, split into `chunk_size` pieces.
    pub async fn upload_image(
        &mut self,
        laptop_id: &str,
        image_type: &str,
        data: &[u8],
        chunk_size: usize,
    ) -> std::result::Result<UploadImageResponse, Status> {
        let info = UploadImageRequest {
            data: Some(Data::Info(ImageInfo {
                laptop_id: laptop_id.to_string(),
                image_type: image_type.to_string(),
            })),
        };

        let chunks = data.chunks(chunk_size.max(1)).map(|chunk| UploadImageRequest {
            data: Some(Data::ChunkData(chunk.to_vec())),
        });

        let messages: Vec<_> = std::iter::once(info).chain(chunks).collect();
        let response = self
            .inner
            .upload_image(tokio_stream::iter(messages))
            .await?;

        Ok(response.into_inner())
    }

    /// Sends each `(laptop_id, score)` pair over one rating stream.
    ///
    /// Stops at the first rejected rating and returns its status.
    pub async fn rate(
        &mut self,
        ratings: Vec<(String, f64)>,
    ) -> std::result::Result<Vec<RateLaptopResponse>, Status> {
        let requests: Vec<_> = ratings
            .into_iter()
            .map(|(laptop_id, score)| RateLaptopRequest { laptop_id, score })
            .collect();
        let expected = requests.len();

        let mut stream = self
            .inner
            .rate_laptop(tokio_stream::iter(requests))
            .await?
            .into_inner();

        let mut responses = Vec::with_capacity(expected);
        while let Some(response) = stream.message().await? {
            responses.push(response);
        }
        Ok(responses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_sent_as_bearer() {
        let mut interceptor = AuthInterceptor::new("abc.def.ghi").unwrap();
        let request = interceptor.call(Request::new(())).unwrap();

        assert_eq!(
            request.metadata().get(AUTHORIZATION_HEADER).unwrap(),
            "Bearer abc.def.ghi"
        );
    }

    #[test]
    fn anonymous_sends_nothing() {
        let mut interceptor = AuthInterceptor::anonymous();
        let request = interceptor.call(Request::new(())).unwrap();

        assert!(request.metadata().get(AUTHORIZATION_HEADER).is_none());
    }

    #[test]
    fn non_ascii_token_is_rejected() {
        assert!(matches!(
            AuthInterceptor::new("tökén"),
            Err(Error::InvalidArgument(_))
        ));
    }
}
