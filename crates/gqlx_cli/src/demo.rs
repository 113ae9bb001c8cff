//! The demo schema served by `gqlx exec` and `gqlx serve`.
//!
//! ```graphql
//! interface Node { id: ID! }
//! type Book implements Node { id: ID! title: String! genre: Genre! year: Int! views: Int! author: Author }
//! type Author implements Node { id: ID! name: String! books: [Book!]! }
//! union SearchResult = Book | Author
//! enum Genre { FICTION SCIENCE HISTORY }
//! input YearRange { from: Int! to: Int = 2100 }
//! type Query {
//!   books(genre: Genre, published: YearRange): [Book!]!
//!   book(id: ID!): Book
//!   authors: [Author!]!
//!   node(id: ID!): Node
//!   search(text: String!): [SearchResult!]!
//! }
//! type Mutation { recordView(id: ID!): Int! }
//! ```
//!
//! `Book.author` goes through a per-request [`BatchLoader`], so the authors of
//! every book in a response are fetched in one call.

use gqlx_runtime::{
    ArgumentDef, BatchLoader, Context, EnumType, FieldDef, FieldError, InputFieldDef,
    InputObjectType, InterfaceType, Listener, LoaderListener, ObjectType, Schema, SchemaError,
    UnionType, Value,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Loads authors by id.
pub type AuthorLoader = BatchLoader<String, Value>;

struct BookRecord {
    id: &'static str,
    title: &'static str,
    genre: &'static str,
    year: i64,
    author: &'static str,
}

struct AuthorRecord {
    id: &'static str,
    name: &'static str,
}

/// The data behind the demo schema.
pub struct Library {
    books: Vec<BookRecord>,
    authors: Vec<AuthorRecord>,
    views: Mutex<HashMap<String, i64>>,
}

impl Library {
    fn book(&self, id: &str) -> Option<&BookRecord> {
        self.books.iter().find(|book| book.id == id)
    }

    fn author(&self, id: &str) -> Option<&AuthorRecord> {
        self.authors.iter().find(|author| author.id == id)
    }

    fn views(&self, id: &str) -> i64 {
        let views = self.views.lock().unwrap_or_else(PoisonError::into_inner);
        views.get(id).copied().unwrap_or_default()
    }

    fn record_view(&self, id: &str) -> i64 {
        let mut views = self.views.lock().unwrap_or_else(PoisonError::into_inner);
        let count = views.entry(id.to_string()).or_default();
        *count += 1;
        *count
    }

    fn book_value(book: &BookRecord) -> Value {
        Value::map([
            ("__typename", Value::from("Book")),
            ("id", Value::from(book.id)),
            ("title", Value::from(book.title)),
            ("genre", Value::from(book.genre)),
            ("year", Value::Int(book.year)),
            ("authorId", Value::from(book.author)),
        ])
    }

    fn author_value(author: &AuthorRecord) -> Value {
        Value::map([
            ("__typename", Value::from("Author")),
            ("id", Value::from(author.id)),
            ("name", Value::from(author.name)),
        ])
    }
}

/// The bundled sample data.
#[must_use]
pub fn library() -> Arc<Library> {
    let book = |id, title, genre, year, author| BookRecord {
        id,
        title,
        genre,
        year,
        author,
    };
    Arc::new(Library {
        books: vec![
            book("b1", "The Left Hand of Darkness", "FICTION", 1969, "a1"),
            book("b2", "The Dispossessed", "FICTION", 1974, "a1"),
            book("b3", "A Brief History of Time", "SCIENCE", 1988, "a2"),
            book("b4", "The Guns of August", "HISTORY", 1962, "a3"),
            book("b5", "Cosmos", "SCIENCE", 1980, "a4"),
        ],
        authors: vec![
            AuthorRecord {
                id: "a1",
                name: "Ursula K. Le Guin",
            },
            AuthorRecord {
                id: "a2",
                name: "Stephen Hawking",
            },
            AuthorRecord {
                id: "a3",
                name: "Barbara W. Tuchman",
            },
            AuthorRecord {
                id: "a4",
                name: "Carl Sagan",
            },
        ],
        views: Mutex::new(HashMap::new()),
    })
}

fn string_arg<'a>(value: Option<&'a Value>, name: &str) -> Result<&'a str, FieldError> {
    value
        .and_then(Value::as_str)
        .ok_or_else(|| FieldError::argument(format!("argument \"{name}\" must be a string")))
}

/// Builds the demo schema over `library`.
pub fn schema(library: &Arc<Library>) -> Result<Arc<Schema>, SchemaError> {
    let books = {
        let library = Arc::clone(library);
        FieldDef::new("books", "[Book!]!")
            .with_description("Books, optionally filtered by genre and publication year")
            .with_argument(ArgumentDef::new("genre", "Genre"))
            .with_argument(ArgumentDef::new("published", "YearRange"))
            .resolve_full(move |rc, _| {
                let genre = rc.argument("genre").and_then(Value::as_str);
                let range = rc.argument("published").filter(|v| !v.is_null());
                let from = range.and_then(|r| r.get("from")).and_then(Value::as_i64);
                let to = range.and_then(|r| r.get("to")).and_then(Value::as_i64);
                let items = library
                    .books
                    .iter()
                    .filter(|book| genre.map_or(true, |g| book.genre == g))
                    .filter(|book| from.map_or(true, |from| book.year >= from))
                    .filter(|book| to.map_or(true, |to| book.year <= to))
                    .map(Library::book_value)
                    .collect();
                Ok(Value::list(items))
            })
    };
    let book = {
        let library = Arc::clone(library);
        FieldDef::new("book", "Book")
            .with_argument(ArgumentDef::new("id", "ID!"))
            .resolve_full(move |rc, _| {
                let id = string_arg(rc.argument("id"), "id")?;
                Ok(library.book(id).map(Library::book_value).into())
            })
    };
    let authors = {
        let library = Arc::clone(library);
        FieldDef::new("authors", "[Author!]!").resolve(move |_| {
            Ok(Value::list(
                library.authors.iter().map(Library::author_value).collect(),
            ))
        })
    };
    let node = {
        let library = Arc::clone(library);
        FieldDef::new("node", "Node")
            .with_argument(ArgumentDef::new("id", "ID!"))
            .resolve_full(move |rc, _| {
                let id = string_arg(rc.argument("id"), "id")?;
                let found = library
                    .book(id)
                    .map(Library::book_value)
                    .or_else(|| library.author(id).map(Library::author_value));
                Ok(found.into())
            })
    };
    let search = {
        let library = Arc::clone(library);
        FieldDef::new("search", "[SearchResult!]!")
            .with_argument(ArgumentDef::new("text", "String!"))
            .resolve_full(move |rc, _| {
                let text = string_arg(rc.argument("text"), "text")?.to_lowercase();
                let books = library
                    .books
                    .iter()
                    .filter(|book| book.title.to_lowercase().contains(&text))
                    .map(Library::book_value);
                let authors = library
                    .authors
                    .iter()
                    .filter(|author| author.name.to_lowercase().contains(&text))
                    .map(Library::author_value);
                Ok(Value::list(books.chain(authors).collect()))
            })
    };
    let views = {
        let library = Arc::clone(library);
        FieldDef::new("views", "Int!").resolve(move |book| {
            let id = string_arg(book.get("id"), "id")?;
            Ok(Value::Int(library.views(id)))
        })
    };
    let author_books = {
        let library = Arc::clone(library);
        FieldDef::new("books", "[Book!]!").resolve(move |author| {
            let id = string_arg(author.get("id"), "id")?;
            Ok(Value::list(
                library
                    .books
                    .iter()
                    .filter(|book| book.author == id)
                    .map(Library::book_value)
                    .collect(),
            ))
        })
    };
    let record_view = {
        let library = Arc::clone(library);
        FieldDef::new("recordView", "Int!")
            .with_description("Counts a view of a book and returns the new total")
            .with_argument(ArgumentDef::new("id", "ID!"))
            .resolve_full(move |rc, _| {
                let id = string_arg(rc.argument("id"), "id")?;
                if library.book(id).is_none() {
                    return Err(FieldError::new(format!("no book with id \"{id}\"")));
                }
                Ok(Value::Int(library.record_view(id)))
            })
    };
    let author = FieldDef::new("author", "Author").resolve_with_context(|ctx, book| {
        let loader = ctx
            .get::<AuthorLoader>()
            .ok_or_else(|| FieldError::new("author loader is not installed"))?;
        let id = string_arg(book.get("authorId"), "authorId")?;
        Ok(loader.load(id.to_string()))
    });

    Schema::builder("Query")
        .mutation("Mutation")
        .object(
            ObjectType::new("Query")
                .with_field(books)
                .with_field(book)
                .with_field(authors)
                .with_field(node)
                .with_field(search),
        )
        .object(ObjectType::new("Mutation").with_field(record_view))
        .interface(InterfaceType::new("Node").with_field(FieldDef::new("id", "ID!")))
        .object(
            ObjectType::new("Book")
                .implements("Node")
                .with_field(FieldDef::new("id", "ID!"))
                .with_field(FieldDef::new("title", "String!"))
                .with_field(FieldDef::new("genre", "Genre!"))
                .with_field(FieldDef::new("year", "Int!"))
                .with_field(views)
                .with_field(author),
        )
        .object(
            ObjectType::new("Author")
                .implements("Node")
                .with_field(FieldDef::new("id", "ID!"))
                .with_field(FieldDef::new("name", "String!"))
                .with_field(author_books),
        )
        .union(
            UnionType::new("SearchResult")
                .with_member("Book")
                .with_member("Author"),
        )
        .enumeration(
            EnumType::new("Genre")
                .with_value("FICTION")
                .with_value("SCIENCE")
                .with_value("HISTORY"),
        )
        .input_object(
            InputObjectType::new("YearRange")
                .with_field(InputFieldDef::new("from", "Int!"))
                .with_field(InputFieldDef::new("to", "Int").with_default(2100)),
        )
        .build()
}

/// A fresh request context carrying its own author loader.
#[must_use]
pub fn context(library: &Arc<Library>) -> Context {
    let library = Arc::clone(library);
    let loader: AuthorLoader = BatchLoader::new(move |ids: Vec<String>| {
        tracing::debug!(keys = ids.len(), "loading authors");
        Ok(ids
            .into_iter()
            .filter_map(|id| {
                let author = library.author(&id).map(Library::author_value)?;
                Some((id, author))
            })
            .collect())
    });
    Context::new().with(loader)
}

/// A listener that flushes the context's author loader whenever execution idles.
#[must_use]
pub fn listener(ctx: &Context) -> Box<dyn Listener> {
    let mut listener = LoaderListener::new();
    if let Some(loader) = ctx.get::<AuthorLoader>() {
        listener = listener.with_loader(loader.clone());
    }
    Box::new(listener)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gqlx_runtime::{parse_variables, PreparedQuery};

    fn run(source: &str, variables: &str) -> (String, usize) {
        let library = library();
        let schema = schema(&library).unwrap();
        let query = PreparedQuery::prepare(&schema, source, "").unwrap();
        let ctx = context(&library);
        let listener = listener(&ctx);
        let variables = parse_variables(variables).unwrap();
        let out = query.execute(&ctx, Value::Null, &variables, Some(&*listener));
        let batches = ctx.get::<AuthorLoader>().unwrap().batches_dispatched();
        (String::from_utf8(out).unwrap(), batches)
    }

    #[test]
    fn test_authors_are_loaded_in_one_batch() {
        let (out, batches) = run("{ books { title author { name } } }", "");
        insta::assert_snapshot!(
            out,
            @r#"{"data":{"books":[{"title":"The Left Hand of Darkness","author":{"name":"Ursula K. Le Guin"}},{"title":"The Dispossessed","author":{"name":"Ursula K. Le Guin"}},{"title":"A Brief History of Time","author":{"name":"Stephen Hawking"}},{"title":"The Guns of August","author":{"name":"Barbara W. Tuchman"}},{"title":"Cosmos","author":{"name":"Carl Sagan"}}]}}"#
        );
        assert_eq!(batches, 1);
    }

    #[test]
    fn test_filters_and_abstract_types() {
        let (out, _) = run(
            "query($g: Genre) { books(genre: $g, published: {from: 1985}) { id genre } search(text: \"le\") { __typename ... on Author { name } ... on Book { title } } node(id: \"a4\") { id ... on Author { name } } }",
            r#"{"g": "SCIENCE"}"#,
        );
        insta::assert_snapshot!(
            out,
            @r#"{"data":{"books":[{"id":"b3","genre":"SCIENCE"}],"search":[{"__typename":"Book","title":"The Left Hand of Darkness"},{"__typename":"Author","name":"Ursula K. Le Guin"}],"node":{"id":"a4","name":"Carl Sagan"}}}"#
        );
    }

    #[test]
    fn test_mutation_counts_views() {
        let library = library();
        let schema = schema(&library).unwrap();
        let mutation =
            PreparedQuery::prepare(&schema, "mutation { a: recordView(id: \"b1\") b: recordView(id: \"b1\") }", "")
                .unwrap();
        let out = mutation.execute(&context(&library), Value::Null, &Default::default(), None);
        assert_eq!(out, br#"{"data":{"a":1,"b":2}}"#);

        let query = PreparedQuery::prepare(&schema, "{ book(id: \"b1\") { views } }", "").unwrap();
        let out = query.execute(&context(&library), Value::Null, &Default::default(), None);
        assert_eq!(out, br#"{"data":{"book":{"views":2}}}"#);
    }
}
