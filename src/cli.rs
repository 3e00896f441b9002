use std::path::PathBuf;

use clap::Subcommand;

use crate::client::SnapgramClient;
use crate::domain::{Credentials, ImageUpload, NewUser, PostId, User, UserId};
use crate::error::{AppError, AppResult};

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create an account and sign in
    SignUp {
        #[arg(long)]
        name: String,
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Sign in with email and password
    SignIn {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// End the current session
    SignOut,
    /// Show the signed-in profile
    Whoami,
    /// Newest posts
    Recent,
    /// Page through the infinite feed
    Feed {
        #[arg(long, default_value_t = 3)]
        pages: u32,
    },
    /// Full-text search over captions
    Search { term: String },
    /// Create a post from an image file
    CreatePost {
        #[arg(long)]
        caption: String,
        #[arg(long)]
        image: PathBuf,
        #[arg(long)]
        location: Option<String>,
        /// Comma-separated tags
        #[arg(long)]
        tags: Option<String>,
    },
    /// Delete a post and its backing image
    DeletePost { post_id: String },
    /// Toggle a like on a post
    Like { post_id: String },
    /// Toggle a save on a post
    Save { post_id: String },
    /// Posts you saved
    Saved,
    /// Browse profiles
    Users,
    /// Show a profile and its posts
    Profile { user_id: String },
}

/// Startup gate for commands that need a session: skips the identity
/// round trip entirely when no prior token set is persisted.
async fn require_session(client: &SnapgramClient) -> AppResult<User> {
    if !client.session().bootstrap().await {
        return Err(AppError::Unauthorized);
    }
    client.session().session().await.ok_or(AppError::Unauthorized)
}

fn print_post(post: &crate::domain::Post) {
    let location = post.location.as_deref().unwrap_or("-");
    println!(
        "[{}] {} ({} likes, {}) by {}",
        post.id,
        post.caption,
        post.liked_by.len(),
        location,
        post.creator
    );
}

pub async fn run(command: Command, client: &SnapgramClient) -> AppResult<()> {
    match command {
        Command::SignUp {
            name,
            username,
            email,
            password,
        } => {
            let user = client
                .sign_up(&NewUser {
                    name,
                    username,
                    email,
                    password,
                })
                .await?;
            println!("Signed up as @{}", user.username);
        }
        Command::SignIn { email, password } => {
            let user = client.sign_in(&Credentials { email, password }).await?;
            println!("Signed in as @{}", user.username);
        }
        Command::SignOut => {
            client.sign_out().await;
            println!("Signed out");
        }
        Command::Whoami => {
            let user = require_session(client).await?;
            println!("@{} ({})", user.username, user.name);
            if !user.bio.is_empty() {
                println!("{}", user.bio);
            }
        }
        Command::Recent => {
            for post in client.recent_posts().await? {
                print_post(&post);
            }
        }
        Command::Feed { pages } => {
            let mut pager = client.feed();
            for _ in 0..pages {
                let page = pager.next_page().await?;
                if page.is_empty() {
                    println!("End of posts");
                    break;
                }
                for post in &page {
                    print_post(post);
                }
            }
        }
        Command::Search { term } => {
            let posts = client.search_posts(&term).await?;
            if posts.is_empty() {
                println!("No results for \"{}\"", term);
            }
            for post in posts {
                print_post(&post);
            }
        }
        Command::CreatePost {
            caption,
            image,
            location,
            tags,
        } => {
            let user = require_session(client).await?;
            let bytes = std::fs::read(&image)?;
            let filename = image
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "upload".to_string());
            let post = client
                .create_post(crate::domain::NewPost {
                    creator: user.id,
                    caption,
                    image: ImageUpload {
                        filename,
                        bytes: bytes.into(),
                    },
                    location,
                    tags,
                })
                .await?;
            println!("Created post {}", post.id);
        }
        Command::DeletePost { post_id } => {
            require_session(client).await?;
            let post = client.get_post(&PostId::new(post_id)).await?;
            client
                .delete_post(&post.id, &post.image_id, &post.creator)
                .await?;
            println!("Deleted post {}", post.id);
        }
        Command::Like { post_id } => {
            let user = require_session(client).await?;
            let post = client.toggle_like(&user.id, &PostId::new(post_id)).await?;
            if post.is_liked_by(&user.id) {
                println!("Liked ({} likes)", post.liked_by.len());
            } else {
                println!("Unliked ({} likes)", post.liked_by.len());
            }
        }
        Command::Save { post_id } => {
            let user = require_session(client).await?;
            let saved = client.toggle_save(&user.id, &PostId::new(post_id)).await?;
            println!("{}", if saved { "Saved" } else { "Removed from saved" });
        }
        Command::Saved => {
            let user = require_session(client).await?;
            let posts = client.saved_posts(&user.id).await?;
            if posts.is_empty() {
                println!("You don't have any saved posts yet.");
            }
            for post in posts {
                print_post(&post);
            }
        }
        Command::Users => {
            for user in client.list_users().await? {
                println!("[{}] @{} ({})", user.id, user.username, user.name);
            }
        }
        Command::Profile { user_id } => {
            let user = client.get_user(&UserId::new(user_id)).await?;
            println!("@{} ({})", user.username, user.name);
            if !user.bio.is_empty() {
                println!("{}", user.bio);
            }
            let posts = client.posts_by_creator(&user.id).await?;
            println!("{} posts", posts.len());
            for post in posts {
                print_post(&post);
            }
        }
    }
    Ok(())
}
