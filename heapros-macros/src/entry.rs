use proc_macro2::{Span, TokenStream};
use quote::{quote, quote_spanned};
use syn::ItemFn;
use syn::parse::Parser;
use syn::spanned::Spanned;

use crate::parse::*;

// syn::AttributeArgs does not implement syn::Parse
type AttributeArgs = syn::punctuated::Punctuated<syn::Meta, syn::Token![,]>;

/// Smallest execution stack the runtime accepts.
const MIN_STACK_SIZE: usize = 16 * 1024;

/// Config used in case of the attribute not being able to build a valid config
const DEFAULT_ERROR_CONFIG: FinalConfig = FinalConfig {
    stack_size: None,
    max_coroutines: None,
};

/// For example:
///
/// ```rust,no_run
/// #[heapros::main(stack_size = 65536)]
/// fn main() {
///     println!("Hello world");
/// }
/// ```
///
/// `args` holds everything between the attribute parentheses,
/// `stack_size = 65536`, and `item` the function it is attached to. The
/// function body becomes the root coroutine.
pub(crate) fn main(args: TokenStream, item: TokenStream) -> TokenStream {
    // If any of the steps for this macro fail, we still want to expand to an item that is as close
    // to the expected output as possible. This helps out IDEs such that completions and other
    // related features keep working.
    let input: ItemFn = match syn::parse2(item.clone()) {
        Ok(it) => it,
        Err(e) => return token_stream_with_error(item, e),
    };

    let config = if input.sig.ident == "main" && !input.sig.inputs.is_empty() {
        let msg = "the main function cannot accept arguments";
        Err(syn::Error::new_spanned(&input.sig.ident, msg))
    } else if let syn::ReturnType::Type(_, ret) = &input.sig.output {
        let msg = "the main function cannot return a value, call `heapros::exit` to set the exit code";
        Err(syn::Error::new_spanned(ret, msg))
    } else {
        AttributeArgs::parse_terminated
            .parse2(args)
            .and_then(|args| build_config(&input, args, false))
    };

    match config {
        Ok(config) => parse_knobs(input, false, config),
        Err(e) => token_stream_with_error(parse_knobs(input, false, DEFAULT_ERROR_CONFIG), e),
    }
}

pub(crate) fn test(args: TokenStream, item: TokenStream) -> TokenStream {
    // If any of the steps for this macro fail, we still want to expand to an item that is as close
    // to the expected output as possible. This helps out IDEs such that completions and other
    // related features keep working.
    let input: ItemFn = match syn::parse2(item.clone()) {
        Ok(it) => it,
        Err(e) => return token_stream_with_error(item, e),
    };

    let config = if let Some(attr) = input.attrs.iter().find(|attr| is_test_attribute(attr)) {
        let msg = "second test attribute is supplied, consider removing or changing the order of your test attributes";
        Err(syn::Error::new_spanned(attr, msg))
    } else if !input.sig.inputs.is_empty() {
        let msg = "test functions cannot accept arguments";
        Err(syn::Error::new_spanned(&input.sig.inputs, msg))
    } else {
        AttributeArgs::parse_terminated
            .parse2(args)
            .and_then(|args| build_config(&input, args, true))
    };

    match config {
        Ok(config) => parse_knobs(input, true, config),
        Err(e) => token_stream_with_error(parse_knobs(input, true, DEFAULT_ERROR_CONFIG), e),
    }
}

struct FinalConfig {
    stack_size: Option<usize>,
    max_coroutines: Option<usize>,
}

struct ConfigBuilder {
    stack_size: Option<usize>,
    max_coroutines: Option<usize>,
    is_test: bool,
}

impl ConfigBuilder {
    fn new(is_test: bool) -> Self {
        ConfigBuilder {
            stack_size: None,
            max_coroutines: None,
            is_test,
        }
    }

    fn macro_name(&self) -> &'static str {
        if self.is_test {
            "heapros::test"
        } else {
            "heapros::main"
        }
    }

    fn set_stack_size(&mut self, stack_size: syn::Lit, span: Span) -> Result<(), syn::Error> {
        if self.stack_size.is_some() {
            return Err(syn::Error::new(span, "`stack_size` set multiple times."));
        }

        let stack_size = parse_int(stack_size, span, "stack_size")?;
        if !stack_size.is_power_of_two() {
            return Err(syn::Error::new(span, "`stack_size` must be a power of two."));
        }
        if stack_size < MIN_STACK_SIZE {
            let msg = format!("`stack_size` must be at least {MIN_STACK_SIZE} bytes.");
            return Err(syn::Error::new(span, msg));
        }
        self.stack_size = Some(stack_size);

        Ok(())
    }

    fn set_max_coroutines(
        &mut self,
        max_coroutines: syn::Lit,
        span: Span,
    ) -> Result<(), syn::Error> {
        if self.max_coroutines.is_some() {
            return Err(syn::Error::new(
                span,
                "`max_coroutines` set multiple times.",
            ));
        }

        let max_coroutines = parse_int(max_coroutines, span, "max_coroutines")?;
        if max_coroutines == 0 {
            return Err(syn::Error::new(span, "`max_coroutines` may not be 0."));
        }
        self.max_coroutines = Some(max_coroutines);

        Ok(())
    }

    fn build(&self) -> FinalConfig {
        FinalConfig {
            stack_size: self.stack_size,
            max_coroutines: self.max_coroutines,
        }
    }
}

fn build_config(
    input: &ItemFn,
    args: AttributeArgs,
    is_test: bool,
) -> Result<FinalConfig, syn::Error> {
    if let Some(asyncness) = input.sig.asyncness {
        let msg = "coroutines are plain functions, remove the `async` keyword";
        return Err(syn::Error::new_spanned(asyncness, msg));
    }

    let mut config = ConfigBuilder::new(is_test);
    let macro_name = config.macro_name();

    for arg in args {
        match arg {
            syn::Meta::NameValue(namevalue) => {
                let ident = namevalue
                    .path
                    .get_ident()
                    .ok_or_else(|| {
                        syn::Error::new_spanned(&namevalue, "Must have specified ident")
                    })?
                    .to_string()
                    .to_lowercase();
                let lit = match &namevalue.value {
                    syn::Expr::Lit(syn::ExprLit { lit, .. }) => lit,
                    expr => return Err(syn::Error::new_spanned(expr, "Must be a literal")),
                };
                match ident.as_str() {
                    "stack_size" => config.set_stack_size(lit.clone(), lit.span())?,
                    "max_coroutines" => config.set_max_coroutines(lit.clone(), lit.span())?,
                    name => {
                        let msg = format!(
                            "Unknown attribute {name} is specified; expected one of: `stack_size`, `max_coroutines`",
                        );
                        return Err(syn::Error::new_spanned(namevalue, msg));
                    }
                }
            }
            syn::Meta::Path(path) => {
                let name = path
                    .get_ident()
                    .ok_or_else(|| syn::Error::new_spanned(&path, "Must have specified ident"))?
                    .to_string()
                    .to_lowercase();
                let msg = match name.as_str() {
                    "stack_size" | "max_coroutines" => {
                        format!("The `{name}` attribute requires an argument, e.g. #[{macro_name}({name} = ...)].")
                    }
                    name => {
                        format!(
                            "Unknown attribute {name} is specified; expected one of: `stack_size`, `max_coroutines`."
                        )
                    }
                };
                return Err(syn::Error::new_spanned(path, msg));
            }
            other => {
                return Err(syn::Error::new_spanned(
                    other,
                    "Unknown attribute inside the macro",
                ));
            }
        }
    }

    Ok(config.build())
}

fn parse_knobs(input: ItemFn, is_test: bool, config: FinalConfig) -> TokenStream {
    let ItemFn {
        attrs,
        vis,
        mut sig,
        block,
    } = input;

    sig.asyncness = None;

    // If type mismatch occurs, the current rustc points to the last statement.
    let last_stmt_span = block
        .stmts
        .last()
        .map_or_else(Span::call_site, |stmt| stmt.span());

    let mut rt = quote_spanned! {last_stmt_span=>
        heapros::runtime::Builder::new()
    };

    if let Some(v) = config.stack_size {
        rt = quote_spanned! {last_stmt_span=> #rt.stack_size(#v) };
    }

    if let Some(v) = config.max_coroutines {
        rt = quote_spanned! {last_stmt_span=> #rt.max_coroutines(#v) };
    }

    let generated_attrs = if is_test {
        quote! {
            #[::core::prelude::v1::test]
        }
    } else {
        quote! {}
    };

    let body = if is_test {
        let output_type = match &sig.output {
            syn::ReturnType::Default => quote! { () },
            syn::ReturnType::Type(_, ret_type) => quote! { #ret_type },
        };

        // Coroutine bodies return `()`, so the result of the test is carried
        // out through a shared slot.
        quote_spanned! {last_stmt_span=>
            let body = move || -> #output_type #block;
            let slot: ::std::rc::Rc<::std::cell::RefCell<::core::option::Option<#output_type>>> =
                ::std::rc::Rc::new(::std::cell::RefCell::new(::core::option::Option::None));
            let out = ::std::rc::Rc::clone(&slot);

            #[allow(clippy::expect_used, clippy::needless_return)]
            {
                #rt
                    .try_build()
                    .expect("Failed building the Runtime")
                    .run(move || {
                        let ret = body();
                        *out.borrow_mut() = ::core::option::Option::Some(ret);
                    })
                    .expect("Failed running the root coroutine");

                return slot
                    .borrow_mut()
                    .take()
                    .expect("The root coroutine did not return");
            }
        }
    } else {
        quote_spanned! {last_stmt_span=>
            let body = move || #block;

            #[allow(clippy::expect_used)]
            {
                let outcome = #rt
                    .try_build()
                    .expect("Failed building the Runtime")
                    .run(body)
                    .expect("Failed running the root coroutine");

                ::std::process::exit(outcome.code());
            }
        }
    };

    quote! {
        #(#attrs)*
        #generated_attrs
        #vis #sig {
            #body
        }
    }
}
