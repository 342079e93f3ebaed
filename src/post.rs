//! Typed records for rows in the `posts` table. Rows are decoded into these
//! structs once, at the store boundary; everything past that point works
//! with named, typed fields.

/// One tracked post. Maps one-to-one onto a row in the `posts` table.
#[derive(Clone, Debug, PartialEq)]
pub struct Post {
    /// Assigned by the store on insertion; stable for the post's lifetime.
    pub id: i64,

    /// Path of the source file this row tracks.
    pub file: String,

    /// Display title, resolved from the titles resource at ingestion time.
    /// The column is nullable for compatibility with stores written by
    /// older tooling; this implementation always writes a title.
    pub title: Option<String>,

    /// URL-safe identifier derived from the title at creation. Unique
    /// across all posts and never recomputed on update.
    pub slug: String,

    /// Rendered HTML body. Recomputed on every update.
    pub body: String,

    /// First-observed modification time, epoch seconds. Frozen at creation;
    /// the sort key for "newest" queries.
    pub original_time: i64,

    /// Last-observed modification time, epoch seconds. Only ever increases,
    /// driven by the source file's on-disk mtime.
    pub modified_time: i64,

    /// Human-readable rendering of `original_time`, frozen at creation.
    pub formatted_date: String,
}

/// Title-only projection of a post, for index-style listings that don't
/// need the body.
#[derive(Clone, Debug, PartialEq)]
pub struct PostSummary {
    pub title: Option<String>,
    pub formatted_date: String,
    pub slug: String,
}

/// Administrative projection, for listing every tracked row.
#[derive(Clone, Debug, PartialEq)]
pub struct PostListing {
    pub id: i64,
    pub title: Option<String>,
    pub file: String,
}

impl From<&Post> for PostSummary {
    /// Projects a full [`Post`] down to its summary fields.
    fn from(post: &Post) -> PostSummary {
        PostSummary {
            title: post.title.clone(),
            formatted_date: post.formatted_date.clone(),
            slug: post.slug.clone(),
        }
    }
}

impl From<&Post> for PostListing {
    /// Projects a full [`Post`] down to its listing fields.
    fn from(post: &Post) -> PostListing {
        PostListing {
            id: post.id,
            title: post.title.clone(),
            file: post.file.clone(),
        }
    }
}
