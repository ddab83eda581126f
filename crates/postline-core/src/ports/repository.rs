use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::Post;
use crate::error::RepoError;

/// Generic repository trait defining the operations shared by all entities.
#[async_trait]
pub trait BaseRepository<T, ID>: Send + Sync {
    /// Find an entity by its unique ID.
    async fn find_by_id(&self, id: ID) -> Result<Option<T>, RepoError>;

    /// Insert a new entity and return it as stored.
    async fn create(&self, entity: T) -> Result<T, RepoError>;
}

/// Post repository.
#[async_trait]
pub trait PostRepository: BaseRepository<Post, Uuid> {
    /// The most recently created post, if any.
    async fn find_recent(&self) -> Result<Option<Post>, RepoError>;

    /// Up to `limit` posts, newest first.
    async fn list_recent(&self, limit: u64) -> Result<Vec<Post>, RepoError>;
}
