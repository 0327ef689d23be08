use proc_macro2::{Span, TokenStream};
use syn::Attribute;

pub(crate) fn parse_int(int: syn::Lit, span: Span, field: &str) -> Result<usize, syn::Error> {
    match int {
        syn::Lit::Int(lit) => lit.base10_parse::<usize>().map_err(|e| {
            syn::Error::new(
                span,
                format!("Failed to parse value of `{field}` as integer: {e}"),
            )
        }),
        _ => Err(syn::Error::new(
            span,
            format!("Failed to parse value of `{field}` as integer."),
        )),
    }
}

/// Matches `#[test]`, `#[core::prelude::*::test]` and `#[std::prelude::*::test]`,
/// with or without a leading `::`.
pub(crate) fn is_test_attribute(attr: &Attribute) -> bool {
    let syn::Meta::Path(path) = &attr.meta else {
        return false;
    };

    if path.leading_colon.is_none() && path.is_ident("test") {
        return true;
    }

    let segments: Vec<String> = path
        .segments
        .iter()
        .filter(|segment| segment.arguments.is_none())
        .map(|segment| segment.ident.to_string())
        .collect();

    match segments.as_slice() {
        [krate, prelude, _, test] => {
            (krate == "core" || krate == "std") && prelude == "prelude" && test == "test"
        }
        _ => false,
    }
}

pub(crate) fn token_stream_with_error(mut tokens: TokenStream, error: syn::Error) -> TokenStream {
    tokens.extend(error.into_compile_error());
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    #[test]
    fn test_is_test_attribute() {
        let attrs: [(Attribute, bool); 5] = [
            (parse_quote!(#[test]), true),
            (parse_quote!(#[::core::prelude::v1::test]), true),
            (parse_quote!(#[std::prelude::rust_2024::test]), true),
            (parse_quote!(#[heapros::test]), false),
            (parse_quote!(#[inline]), false),
        ];

        for (attr, expected) in attrs {
            assert_eq!(is_test_attribute(&attr), expected);
        }
    }

    #[test]
    fn test_parse_int() {
        let span = Span::call_site();
        assert_eq!(parse_int(parse_quote!(42), span, "n").unwrap(), 42);
        assert!(parse_int(parse_quote!("42"), span, "n").is_err());
    }
}
