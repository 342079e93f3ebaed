use anyhow::{anyhow, Result};
use blogsync::config::Config;
use blogsync::store::Store;
use blogsync::titles::TitleIndex;
use clap::{App, AppSettings, Arg, SubCommand};
use std::path::{Path, PathBuf};

fn main() -> Result<()> {
    let matches = App::new("blogsync")
        .version(clap::crate_version!())
        .about("Synchronizes a directory of markdown blog posts with a SQLite database")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("directory")
                .short("C")
                .long("directory")
                .value_name("DIR")
                .takes_value(true)
                .help("Starts project discovery from DIR instead of the working directory"),
        )
        .subcommand(
            SubCommand::with_name("sync")
                .about("Adds new posts and refreshes posts whose files changed"),
        )
        .subcommand(SubCommand::with_name("list").about("Lists every tracked post"))
        .subcommand(
            SubCommand::with_name("recent")
                .about("Shows the newest posts")
                .arg(
                    Arg::with_name("limit")
                        .short("n")
                        .long("limit")
                        .value_name("N")
                        .takes_value(true)
                        .default_value("10")
                        .help("How many posts to show"),
                ),
        )
        .subcommand(
            SubCommand::with_name("show")
                .about("Prints one post by its slug")
                .arg(Arg::with_name("slug").required(true)),
        )
        .subcommand(
            SubCommand::with_name("add")
                .about("Ingests a single source file")
                .arg(Arg::with_name("file").required(true)),
        )
        .subcommand(
            SubCommand::with_name("rm")
                .about("Deletes posts by id")
                .arg(Arg::with_name("id").required(true).multiple(true)),
        )
        .get_matches();

    let root = match matches.value_of("directory") {
        Some(dir) => PathBuf::from(dir),
        None => std::env::current_dir()?,
    };
    let config = Config::from_directory(&root)?;
    let titles = TitleIndex::new(&config.titles, &config.posts);
    let mut store = Store::open(&config.database, &config.posts, titles)?;

    match matches.subcommand() {
        ("sync", _) => {
            let added = store.check_new_posts()?;
            for file in &added {
                println!("Added: {}", file);
            }
            let updated = store.refresh()?;
            for file in &updated {
                println!("Updated: {}", file);
            }
            if added.is_empty() && updated.is_empty() {
                println!("Nothing to do.");
            }
        }
        ("list", _) => {
            for post in store.list_posts()? {
                println!(
                    "{:>4}  {}  ({})",
                    post.id,
                    post.title.as_deref().unwrap_or("(untitled)"),
                    post.file
                );
            }
        }
        ("recent", Some(m)) => {
            let limit = m.value_of("limit").unwrap().parse()?;
            for summary in store.newest_titles(limit)? {
                println!(
                    "{}  {}  [{}]",
                    summary.formatted_date,
                    summary.title.as_deref().unwrap_or("(untitled)"),
                    summary.slug
                );
            }
        }
        ("show", Some(m)) => {
            let slug = m.value_of("slug").unwrap();
            match store.post_by_slug(slug)? {
                Some(post) => {
                    if let Some(title) = &post.title {
                        println!("{}", title);
                    }
                    println!("{}", post.formatted_date);
                    println!();
                    print!("{}", post.body);
                }
                None => {
                    eprintln!("No post with slug `{}`", slug);
                    std::process::exit(1);
                }
            }
        }
        ("add", Some(m)) => {
            let file = Path::new(m.value_of("file").unwrap());
            let id = store.add_post(file)?;
            println!("Added post {} from {}", id, file.display());
        }
        ("rm", Some(m)) => {
            let ids = m
                .values_of("id")
                .unwrap()
                .map(|raw| {
                    raw.parse::<i64>()
                        .map_err(|e| anyhow!("Invalid id `{}`: {}", raw, e))
                })
                .collect::<Result<Vec<i64>>>()?;
            store.delete_posts(&ids)?;
            println!("Deleted {} post(s)", ids.len());
        }
        _ => unreachable!("clap requires a known subcommand"),
    }

    Ok(())
}
