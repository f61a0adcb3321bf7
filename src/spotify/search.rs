use super::{ApiError, SpotifyClient};
use crate::types::{SearchResponse, TrackSummary};

pub const MAX_SEARCH_LIMIT: u32 = 50;

impl SpotifyClient {
    /// Searches tracks matching `query`, best match first.
    ///
    /// # Arguments
    ///
    /// * `token` - Access token of the signed-in user; no scope needed
    /// * `query` - Free text, usually "Artist - Title"
    /// * `limit` - Number of results, clamped to 1..=50
    ///
    /// # Returns
    ///
    /// Flattened track summaries in Spotify's ranking order. An empty
    /// vector when nothing matches.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the request fails after retries or the
    /// body cannot be decoded.
    pub async fn search_tracks(
        &self,
        token: &str,
        query: &str,
        limit: u32,
    ) -> Result<Vec<TrackSummary>, ApiError> {
        let url = self.endpoint(&["search"]);
        let limit = limit.clamp(1, MAX_SEARCH_LIMIT).to_string();

        let res = self
            .send(|http| {
                http.get(url.clone())
                    .bearer_auth(token)
                    .query(&[("q", query), ("type", "track"), ("limit", limit.as_str())])
            })
            .await?;

        let body = res.json::<SearchResponse>().await?;
        Ok(body.tracks.items.into_iter().map(TrackSummary::from).collect())
    }

    /// Best match for `query`, if there is any.
    pub async fn search_first(
        &self,
        token: &str,
        query: &str,
    ) -> Result<Option<TrackSummary>, ApiError> {
        Ok(self.search_tracks(token, query, 1).await?.into_iter().next())
    }
}
