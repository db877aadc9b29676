mod names;
mod select;

use proc_macro2::TokenStream;
use quote::{quote, ToTokens};
use syn::Ident;

pub use names::NameAllocator;
pub use select::{Location, MemberKind, MemberSelect, ShardId};

/// A field of a generated type.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: Ident,
    pub ty: TokenStream,
}

/// The receiver form of a generated method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Receiver {
    /// Associated function, no receiver.
    Static,
    /// `&self`.
    Ref,
    /// `&mut self`.
    RefMut,
    /// `mut self`, for builder-style chaining.
    Owned,
}

/// A method of a generated type.
///
/// The body is a sequence of opaque statements; callers include trailing
/// semicolons where they want them, so an expression-bodied method is a
/// single statement without one.
#[derive(Debug, Clone)]
pub struct MethodSpec {
    pub name: Ident,
    pub attrs: Vec<TokenStream>,
    pub receiver: Receiver,
    pub params: Vec<(Ident, TokenStream)>,
    pub ret: Option<TokenStream>,
    pub body: Vec<TokenStream>,
    pub public: bool,
}

impl MethodSpec {
    pub fn new(name: Ident, receiver: Receiver) -> Self {
        Self {
            name,
            attrs: Vec::new(),
            receiver,
            params: Vec::new(),
            ret: None,
            body: Vec::new(),
            public: false,
        }
    }
}

impl ToTokens for MethodSpec {
    fn to_tokens(&self, tokens: &mut TokenStream) {
        let attrs = &self.attrs;
        let name = &self.name;
        let vis = if self.public {
            quote! { pub }
        } else {
            TokenStream::new()
        };
        let receiver = match self.receiver {
            Receiver::Static => TokenStream::new(),
            Receiver::Ref => quote! { &self, },
            Receiver::RefMut => quote! { &mut self, },
            Receiver::Owned => quote! { mut self, },
        };
        let params = self.params.iter().map(|(name, ty)| quote! { #name: #ty, });
        let ret = match &self.ret {
            Some(ty) => quote! { -> #ty },
            None => TokenStream::new(),
        };
        let body = &self.body;
        tokens.extend(quote! {
            #(#attrs)*
            #vis fn #name(#receiver #(#params)*) #ret {
                #(#body)*
            }
        });
    }
}

/// Description of one generated type: its fields, inherent methods, extra
/// trait-impl items and nested types.
///
/// This is the hand-off format to the external emission facility; rendering
/// to tokens flattens nested types into sibling items, with name uniqueness
/// guaranteed by the per-scope allocators.
#[derive(Debug, Clone)]
pub struct TypeSpec {
    pub name: Ident,
    pub type_params: Vec<Ident>,
    pub fields: Vec<FieldSpec>,
    pub methods: Vec<MethodSpec>,
    pub extra_items: Vec<TokenStream>,
    pub nested: Vec<TypeSpec>,
}

impl TypeSpec {
    pub fn new(name: Ident) -> Self {
        Self {
            name,
            type_params: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            extra_items: Vec::new(),
            nested: Vec::new(),
        }
    }
}

impl ToTokens for TypeSpec {
    fn to_tokens(&self, tokens: &mut TokenStream) {
        let name = &self.name;
        let params = &self.type_params;
        let generics = if params.is_empty() {
            TokenStream::new()
        } else {
            quote! { <#(#params),*> }
        };
        let fields = self.fields.iter().map(|field| {
            let field_name = &field.name;
            let ty = &field.ty;
            quote! { #field_name: #ty, }
        });
        let methods = &self.methods;
        let extra = &self.extra_items;
        let nested = &self.nested;
        tokens.extend(quote! {
            pub struct #name #generics {
                #(#fields)*
            }

            impl #generics #name #generics {
                #(#methods)*
            }

            #(#extra)*

            #(#nested)*
        });
    }
}
