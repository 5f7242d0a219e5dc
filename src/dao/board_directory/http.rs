use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::{Deserialize, Serialize};

use super::{BoardDirectory, CardEntity, DirectoryError, DirectoryResult};

/// Board directory backed by the surrounding application's REST API.
///
/// Endpoints used:
/// - `GET  {base}/cards/{card_id}`
/// - `PATCH {base}/cards/{card_id}` with `{ "storyPoints": n }`
/// - `GET  {base}/boards/{board_id}/members/{user_id}` (2xx member, 404 not)
#[derive(Clone)]
pub struct HttpBoardDirectory {
    client: Client,
    base_url: Arc<Url>,
    token: Option<Arc<str>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StoryPointsPatch {
    story_points: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CardPayload {
    id: String,
    board_id: String,
    list_id: String,
    #[serde(default)]
    story_points: Option<i64>,
}

impl From<CardPayload> for CardEntity {
    fn from(value: CardPayload) -> Self {
        Self {
            id: value.id,
            board_id: value.board_id,
            list_id: value.list_id,
            story_points: value.story_points,
        }
    }
}

impl HttpBoardDirectory {
    /// Client for the board API at `base_url`, optionally sending a bearer token.
    pub fn new(base_url: &str, token: Option<String>) -> DirectoryResult<Self> {
        let base_url = Url::parse(base_url)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| DirectoryError::InvalidUrl {
                url: base_url.to_owned(),
            })?;
        Ok(Self {
            client: Client::new(),
            base_url: Arc::new(base_url),
            token: token.map(Arc::from),
        })
    }

    /// Read `BOARDS_API_URL` and the optional `BOARDS_API_TOKEN`.
    pub fn from_env() -> Option<DirectoryResult<Self>> {
        let base_url = std::env::var("BOARDS_API_URL").ok()?;
        let token = std::env::var("BOARDS_API_TOKEN").ok();
        Some(Self::new(&base_url, token))
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = (*self.base_url).clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty();
            path.extend(segments);
        }
        url
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.token {
            Some(ref token) => builder.bearer_auth(token.as_ref()),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder, path: &str) -> DirectoryResult<reqwest::Response> {
        self.authorized(builder)
            .send()
            .await
            .map_err(|source| DirectoryError::Request {
                path: path.to_owned(),
                source,
            })
    }

    async fn fetch_card(&self, card_id: String) -> DirectoryResult<Option<CardEntity>> {
        let url = self.url(&["cards", &card_id]);
        let path = url.path().to_owned();
        let response = self.send(self.client.get(url), &path).await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => response
                .json::<CardPayload>()
                .await
                .map(|card| Some(card.into()))
                .map_err(|source| DirectoryError::Request { path, source }),
            status => Err(DirectoryError::Status { path, status }),
        }
    }

    async fn patch_story_points(&self, card_id: String, story_points: u32) -> DirectoryResult<()> {
        let url = self.url(&["cards", &card_id]);
        let path = url.path().to_owned();
        let builder = self
            .client
            .patch(url)
            .json(&StoryPointsPatch { story_points });
        let response = self.send(builder, &path).await?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(DirectoryError::CardNotFound { card_id }),
            status if status.is_success() => Ok(()),
            status => Err(DirectoryError::Status { path, status }),
        }
    }

    async fn check_member(&self, board_id: String, user_id: String) -> DirectoryResult<bool> {
        let url = self.url(&["boards", &board_id, "members", &user_id]);
        let path = url.path().to_owned();
        let response = self.send(self.client.get(url), &path).await?;

        match response.status() {
            StatusCode::NOT_FOUND | StatusCode::FORBIDDEN => Ok(false),
            status if status.is_success() => Ok(true),
            status => Err(DirectoryError::Status { path, status }),
        }
    }
}

impl BoardDirectory for HttpBoardDirectory {
    fn find_card(&self, card_id: &str) -> BoxFuture<'static, DirectoryResult<Option<CardEntity>>> {
        let directory = self.clone();
        let card_id = card_id.to_owned();
        Box::pin(async move { directory.fetch_card(card_id).await })
    }

    fn set_story_points(
        &self,
        card_id: &str,
        story_points: u32,
    ) -> BoxFuture<'static, DirectoryResult<()>> {
        let directory = self.clone();
        let card_id = card_id.to_owned();
        Box::pin(async move { directory.patch_story_points(card_id, story_points).await })
    }

    fn is_board_member(
        &self,
        board_id: &str,
        user_id: &str,
    ) -> BoxFuture<'static, DirectoryResult<bool>> {
        let directory = self.clone();
        let board_id = board_id.to_owned();
        let user_id = user_id.to_owned();
        Box::pin(async move { directory.check_member(board_id, user_id).await })
    }
}
