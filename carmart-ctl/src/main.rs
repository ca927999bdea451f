use std::path::PathBuf;

use anyhow::Context;
use carmart_api::{
    AuthToken, CountryCode, CurrencyCode, Language, Listing, ListingId, ListingStatus, Uuid,
};
use carmart_client::{
    currency::format_price, search, CommentWithReplies, ConversionTable, Localized,
};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, RequestBuilder};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};

#[derive(structopt::StructOpt)]
struct Opt {
    #[structopt(short, long, default_value = "http://127.0.0.1:3000")]
    host: String,

    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(structopt::StructOpt)]
enum Command {
    /// List the listings waiting for moderation, oldest first
    Pending,

    /// Move a listing to another status
    Moderate {
        listing: i64,

        /// One of pending, approved, rejected or sold
        status: ListingStatus,
    },

    /// Show the comment threads of a listing
    Comments { listing: i64 },

    /// Convert a price between currencies
    Convert {
        amount: i64,
        from: CurrencyCode,
        to: CurrencyCode,

        /// JSON exchange rate table, the built-in rates are used if unset
        #[structopt(long)]
        rates: Option<PathBuf>,

        #[structopt(long, default_value = "en")]
        lang: Language,
    },

    /// Search listings, eg. `toyota year>=2015 price<=50000 country:AE`
    Search {
        query: String,

        /// newest, oldest, price-asc, price-desc, year-asc, year-desc, mileage-asc or mileage-desc
        #[structopt(long)]
        sort: Option<String>,

        /// Only show listings from this country
        #[structopt(long)]
        country: Option<CountryCode>,
    },
}

fn admin_token() -> anyhow::Result<AuthToken> {
    let tok =
        std::env::var("ADMIN_TOKEN").context("retrieving ADMIN_TOKEN environment variable")?;
    let tok = Uuid::try_parse(&tok).context("parsing ADMIN_TOKEN as an auth token")?;
    Ok(AuthToken(tok))
}

fn client() -> ClientWithMiddleware {
    let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);
    ClientBuilder::new(reqwest::Client::new())
        .with(RetryTransientMiddleware::new_with_policy(retry_policy))
        .build()
}

/// Sends the request, turning API errors into readable ones
async fn send(req: RequestBuilder) -> anyhow::Result<reqwest::Response> {
    let resp = req.send().await.context("sending request to server")?;
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    let body = resp.bytes().await.context("reading error response")?;
    match carmart_api::Error::parse(&body) {
        Ok(err) => Err(err).with_context(|| format!("server answered {status}")),
        Err(_) => anyhow::bail!(
            "server answered {status}: {}",
            String::from_utf8_lossy(&body)
        ),
    }
}

fn print_listing(l: &Listing) {
    println!(
        "#{}\t{}\t{} {} {}\t{}\t{}, {}\t{}{}",
        l.id.0,
        l.status.label(Language::En),
        l.info.year,
        l.info.make,
        l.info.model,
        format_price(l.info.price, &l.info.currency, Language::En),
        l.info.city,
        l.info.country,
        l.created_at.format("%Y-%m-%d"),
        if l.is_featured { "\tfeatured" } else { "" },
    );
}

fn print_thread(thread: &[CommentWithReplies]) {
    for top in thread {
        let c = &top.comment;
        println!(
            "[{}] {} ({}):",
            c.id.0,
            c.user.display_name(),
            c.created_at.format("%Y-%m-%d %H:%M")
        );
        println!("    {}", c.content);
        for r in &top.replies {
            let r = &r.comment;
            println!(
                "    ↳ [{}] {} ({}):",
                r.id.0,
                r.user.display_name(),
                r.created_at.format("%Y-%m-%d %H:%M")
            );
            println!("        {}", r.content);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let opt = <Opt as structopt::StructOpt>::from_args();

    let client = client();

    match opt.cmd {
        Command::Pending => {
            let listings: Vec<Listing> = send(
                client
                    .get(format!("{}/api/admin/pending-listings", opt.host))
                    .bearer_auth(admin_token()?.0),
            )
            .await?
            .json()
            .await
            .context("parsing pending listings")?;
            for l in &listings {
                print_listing(l);
            }
            tracing::debug!(count = listings.len(), "listed pending listings");
        }
        Command::Moderate { listing, status } => {
            let id = ListingId(listing);
            send(
                client
                    .post(format!("{}/api/admin/listings/{}/status", opt.host, id.0))
                    .json(&status)
                    .bearer_auth(admin_token()?.0),
            )
            .await
            .with_context(|| format!("moving listing #{} to {status}", id.0))?;
            println!("listing #{} is now {}", id.0, status.label(Language::En));
        }
        Command::Comments { listing } => {
            let thread: Vec<CommentWithReplies> = send(
                client.get(format!("{}/api/listings/{listing}/comments", opt.host)),
            )
            .await?
            .json()
            .await
            .context("parsing comment threads")?;
            print_thread(&thread);
        }
        Command::Convert {
            amount,
            from,
            to,
            rates,
            lang,
        } => {
            let table = match rates {
                Some(path) => ConversionTable::load(&path)?,
                None => ConversionTable::default(),
            };
            let converted = table.convert(amount, &from, &to)?;
            println!(
                "{} = {}",
                format_price(amount, &from, lang),
                format_price(converted, &to, lang)
            );
        }
        Command::Search {
            query,
            sort,
            country,
        } => {
            let mut search = search::parse(&query, sort.as_deref())?;
            if let Some(country) = country {
                search.filter = search::in_country(search.filter, country);
            }
            let mut req = client
                .post(format!("{}/api/search-listings", opt.host))
                .json(&search);
            // admins also see listings that are not public yet
            if let Ok(tok) = admin_token() {
                req = req.bearer_auth(tok.0);
            }
            let listings: Vec<Listing> = send(req)
                .await?
                .json()
                .await
                .context("parsing search results")?;
            for l in &listings {
                print_listing(l);
            }
        }
    }

    Ok(())
}
