use super::{ApiError, SpotifyClient};
use crate::types::{
    AddTracksRequest, CreatePlaylistRequest, CurrentUser, Paging, Playlist, SnapshotResponse,
};

pub const TRACKS_PER_REQUEST: usize = 100;

impl SpotifyClient {
    /// Profile of the token's user; its `id` owns new playlists.
    pub async fn current_user(&self, token: &str) -> Result<CurrentUser, ApiError> {
        let url = self.endpoint(&["me"]);
        let res = self
            .send(|http| http.get(url.clone()).bearer_auth(token))
            .await?;
        Ok(res.json::<CurrentUser>().await?)
    }

    /// Creates a playlist owned by `user_id`.
    ///
    /// # Arguments
    ///
    /// * `token` - Access token with a `playlist-modify-*` scope
    /// * `user_id` - Spotify id of the owner; must be the token's user
    /// * `request` - Name, description and visibility of the new playlist
    ///
    /// # Returns
    ///
    /// The playlist as Spotify created it.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] on a non-success response. A 502 is not
    /// retried since the playlist may already exist.
    pub async fn create_playlist(
        &self,
        token: &str,
        user_id: &str,
        request: &CreatePlaylistRequest,
    ) -> Result<Playlist, ApiError> {
        let url = self.endpoint(&["users", user_id, "playlists"]);
        let res = self
            .send_write(|http| http.post(url.clone()).bearer_auth(token).json(request))
            .await?;
        Ok(res.json::<Playlist>().await?)
    }

    /// Appends tracks to a playlist, [`TRACKS_PER_REQUEST`] at a time.
    ///
    /// Returns the snapshot id of every request made. An empty `uris` makes
    /// no request at all.
    ///
    /// # Errors
    ///
    /// Stops at the first failed chunk; earlier chunks stay in the playlist.
    /// Like [`SpotifyClient::create_playlist`], a 502 is not retried.
    pub async fn add_tracks(
        &self,
        token: &str,
        playlist_id: &str,
        uris: &[String],
    ) -> Result<Vec<String>, ApiError> {
        let url = self.endpoint(&["playlists", playlist_id, "tracks"]);
        let mut snapshots = Vec::new();

        for chunk in uris.chunks(TRACKS_PER_REQUEST) {
            let body = AddTracksRequest {
                uris: chunk.to_vec(),
            };
            let res = self
                .send_write(|http| http.post(url.clone()).bearer_auth(token).json(&body))
                .await?;
            snapshots.push(res.json::<SnapshotResponse>().await?.snapshot_id);
        }

        Ok(snapshots)
    }

    /// Lists the first `limit` (1 to 50) playlists of the token's user.
    pub async fn current_user_playlists(
        &self,
        token: &str,
        limit: u32,
    ) -> Result<Paging<Playlist>, ApiError> {
        let url = self.endpoint(&["me", "playlists"]);
        let limit = limit.clamp(1, 50).to_string();
        let res = self
            .send(|http| {
                http.get(url.clone())
                    .bearer_auth(token)
                    .query(&[("limit", limit.as_str())])
            })
            .await?;
        Ok(res.json::<Paging<Playlist>>().await?)
    }
}
