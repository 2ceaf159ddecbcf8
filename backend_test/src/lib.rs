use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{parse_macro_input, spanned::Spanned, FnArg, Ident, ItemFn, Pat, Signature, Type};

/// Transform an asynchronous test into a synchronous one running against a
/// fresh in-memory server, and inject dependencies.
///
/// Injectable dependencies are [`rocket::local::asynchronous::Client`],
/// `crate::store::Db` (the server's store) and
/// `crate::notifier::testing::Captured` (every login code the server sent).
///
/// `#[backend_test(admin)]` signs the client in as the bootstrap super admin
/// before the test body runs.
#[proc_macro_attribute]
pub fn backend_test(args: TokenStream, input: TokenStream) -> TokenStream {
    let mut item_fn = parse_macro_input!(input as ItemFn);

    // Extract the arguments to pass and reject invalid function signatures.
    let test_args = match check_sig(item_fn.sig.clone()) {
        Ok(args) => args,
        Err(err) => {
            return err.into_compile_error().into();
        }
    };

    // Rename the future so the test can have its original name.
    let name = item_fn.sig.ident.clone();
    let new_name = format_ident!("{}_fut", name);
    item_fn.sig.ident = new_name.clone();

    // Log in the client as super admin if needed.
    let maybe_login = match parse_macro_input!(args as Option<Ident>) {
        None => TokenStream2::new(),
        Some(arg) if arg == "admin" => quote! {
            {
                let response = rocket_client
                    .post(uri!(crate::api::auth::staff_sign_in))
                    .header(rocket::http::ContentType::JSON)
                    .body(
                        rocket::serde::json::json!({
                            "email": crate::config::examples::SUPER_ADMIN_EMAIL,
                            "password": crate::config::examples::SUPER_ADMIN_PASSWORD,
                        })
                        .to_string(),
                    )
                    .dispatch()
                    .await;
                assert_eq!(response.status(), rocket::http::Status::Ok);
            }
        },
        Some(arg) => {
            return syn::Error::new(arg.span(), "Expected no argument or `admin`")
                .into_compile_error()
                .into();
        }
    };

    // Rewrite the test function.
    quote! {
        #[test]
        fn #name() {
            /// Test setup.
            async fn setup() -> (
                rocket::local::asynchronous::Client,
                crate::store::Db,
                crate::notifier::testing::Captured,
            ) {
                let store: crate::store::Db = std::sync::Arc::new(crate::store::MemoryStore::new());
                let notifier: crate::notifier::testing::Captured = std::sync::Arc::default();
                let rocket = crate::rocket_for_store_and_notifier(store.clone(), notifier.clone()).await;
                let rocket_client = rocket::local::asynchronous::Client::tracked(rocket)
                    .await
                    .unwrap();

                #maybe_login

                (rocket_client, store, notifier)
            }

            /// The test itself.
            #item_fn

            // Everything lives in memory, so there is nothing to clean up.
            let runtime = rocket::tokio::runtime::Builder::new_multi_thread()
                .thread_name("rocket-worker-test-thread")
                .worker_threads(1)
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async {
                #[allow(unused_variables)]
                let (rocket_client, store, notifier) = setup().await;
                #new_name(#(#test_args),*).await;
            });
        }
    }
    .into()
}

/// Ensure the wrapped test is async, extract parameters to inject, and reject unknown parameters.
fn check_sig(sig: Signature) -> Result<Vec<TokenStream2>, syn::Error> {
    if sig.asyncness.is_none() {
        return Err(syn::Error::new(sig.span(), "Test must be marked `async`"));
    }

    let mut has_client = false;
    let mut has_store = false;
    let mut has_notifier = false;
    let mut args = vec![];

    for input in &sig.inputs {
        if let FnArg::Typed(pat_type) = input {
            if let Pat::Ident(_) = &*pat_type.pat {
                if let Type::Path(type_path) = &*pat_type.ty {
                    // Valid as the last path segment for any type is itself.
                    let type_ident = &type_path.path.segments.last().unwrap().ident;
                    let (seen, injected, what) = if type_ident == "Client" {
                        (&mut has_client, quote! { rocket_client }, "`Client`")
                    } else if type_ident == "Db" {
                        (&mut has_store, quote! { store.clone() }, "`Db`")
                    } else if type_ident == "Captured" {
                        (&mut has_notifier, quote! { notifier.clone() }, "`Captured`")
                    } else {
                        return Err(unexpected(input));
                    };
                    if *seen {
                        return Err(syn::Error::new(
                            input.span(),
                            format!("Test cannot accept more than one {what}"),
                        ));
                    }
                    *seen = true;
                    args.push(injected);
                    continue;
                }
            }
        }

        return Err(unexpected(input));
    }

    Ok(args)
}

/// Transform an asynchronous test into a synchronous one running against a
/// `crate::store::MongoStore` over a fresh database.
///
/// The database is dropped WHETHER OR NOT the test passes; a panic in the
/// test is rethrown after cleanup. The server is taken from the `db_uri`
/// configuration value. These tests need a running MongoDB server, so they are
/// ignored by default: run them with `cargo test -- --ignored`.
#[proc_macro_attribute]
pub fn mongo_test(_: TokenStream, input: TokenStream) -> TokenStream {
    let mut item_fn = parse_macro_input!(input as ItemFn);
    if let Err(err) = check_mongo_sig(&item_fn.sig) {
        return err.into_compile_error().into();
    }

    let name = item_fn.sig.ident.clone();
    let new_name = format_ident!("{}_fut", name);
    item_fn.sig.ident = new_name.clone();

    quote! {
        #[test]
        #[ignore = "needs a MongoDB server at `db_uri`"]
        fn #name() {
            /// The test itself.
            #item_fn

            let runtime = rocket::tokio::runtime::Builder::new_multi_thread()
                .thread_name("mongo-test-thread")
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async {
                let (store, db) = crate::store::MongoStore::for_test().await;
                // Run on its own task so a panic comes back as an error.
                let result = rocket::tokio::spawn(#new_name(store)).await;
                db.drop(None).await.unwrap();
                if let Err(err) = result {
                    std::panic::resume_unwind(err.into_panic());
                }
            });
        }
    }
    .into()
}

/// A store test is async and takes exactly one `MongoStore`.
fn check_mongo_sig(sig: &Signature) -> Result<(), syn::Error> {
    if sig.asyncness.is_none() {
        return Err(syn::Error::new(sig.span(), "Test must be marked `async`"));
    }
    let expected = || syn::Error::new(sig.inputs.span(), "Expected one `store_ident: MongoStore`");
    if sig.inputs.len() != 1 {
        return Err(expected());
    }
    match sig.inputs.first() {
        Some(FnArg::Typed(pat_type)) => match &*pat_type.ty {
            Type::Path(type_path)
                if type_path
                    .path
                    .segments
                    .last()
                    .map_or(false, |segment| segment.ident == "MongoStore") =>
            {
                Ok(())
            }
            _ => Err(expected()),
        },
        _ => Err(expected()),
    }
}

fn unexpected(input: &FnArg) -> syn::Error {
    syn::Error::new(
        input.span(),
        "Expected one of `client_ident: Client`, `store_ident: Db` or `notifier_ident: Captured`",
    )
}
