//! Comandos de shell armados como estructura (programa + flags) y
//! serializados una sola vez, en vez de concatenar strings a mano.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    /// `-N valor` (dos tokens)
    Flag(String, String),
    /// `-cwd`
    Switch(String),
    /// `-pe smp 4` (nombre + varios valores)
    Multi(String, Vec<String>),
    /// `--mem=2G` (un token)
    Joined(String, String),
    /// argumento posicional
    Arg(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCommand {
    program: String,
    tokens: Vec<Token>,
}

impl ShellCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            tokens: Vec::new(),
        }
    }

    pub fn flag(mut self, name: &str, value: impl ToString) -> Self {
        self.tokens.push(Token::Flag(name.to_string(), value.to_string()));
        self
    }

    pub fn flag_values(mut self, name: &str, values: &[String]) -> Self {
        self.tokens.push(Token::Multi(name.to_string(), values.to_vec()));
        self
    }

    pub fn switch(mut self, name: &str) -> Self {
        self.tokens.push(Token::Switch(name.to_string()));
        self
    }

    pub fn joined(mut self, name: &str, value: impl ToString) -> Self {
        self.tokens.push(Token::Joined(name.to_string(), value.to_string()));
        self
    }

    pub fn arg(mut self, value: impl ToString) -> Self {
        self.tokens.push(Token::Arg(value.to_string()));
        self
    }

    /// Inserta argumentos extra (sin tocar) justo antes del último posicional,
    /// que en los comandos de envío es siempre el wrapper script.
    pub fn with_extra_args(mut self, extra: &[String]) -> Self {
        if extra.is_empty() {
            return self;
        }
        let pos = self
            .tokens
            .iter()
            .rposition(|t| matches!(t, Token::Arg(_)))
            .unwrap_or(self.tokens.len());
        for (i, value) in extra.iter().enumerate() {
            self.tokens.insert(pos + i, Token::Arg(value.clone()));
        }
        self
    }

    /// Valor del primer flag con ese nombre (para tests y logs).
    pub fn value_of(&self, name: &str) -> Option<&str> {
        self.tokens.iter().find_map(|t| match t {
            Token::Flag(n, v) | Token::Joined(n, v) if n == name => Some(v.as_str()),
            _ => None,
        })
    }

    /// Todos los valores de un flag repetido (`-l short -l vf=4G`).
    pub fn values_of(&self, name: &str) -> Vec<&str> {
        self.tokens
            .iter()
            .filter_map(|t| match t {
                Token::Flag(n, v) | Token::Joined(n, v) if n == name => Some(v.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Posicionales en orden (el último es el wrapper script).
    pub fn positional(&self) -> Vec<&str> {
        self.tokens
            .iter()
            .filter_map(|t| match t {
                Token::Arg(v) => Some(v.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn has_switch(&self, name: &str) -> bool {
        self.tokens
            .iter()
            .any(|t| matches!(t, Token::Switch(n) if n == name))
    }

    /// Línea de comando lista para `sh -c`.
    pub fn render(&self) -> String {
        let mut parts = vec![quote(&self.program)];
        for token in &self.tokens {
            match token {
                Token::Flag(name, value) => {
                    parts.push(quote(name));
                    parts.push(quote(value));
                }
                Token::Multi(name, values) => {
                    parts.push(quote(name));
                    parts.extend(values.iter().map(|v| quote(v)));
                }
                Token::Switch(name) => parts.push(quote(name)),
                Token::Joined(name, value) => parts.push(quote(&format!("{}={}", name, value))),
                Token::Arg(value) => parts.push(quote(value)),
            }
        }
        parts.join(" ")
    }
}

impl fmt::Display for ShellCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

fn is_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || "_-./:=,%@+".contains(c)
}

/// Comillas simples si el token tiene algo que el shell interpretaría.
pub fn quote(token: &str) -> String {
    if !token.is_empty() && token.chars().all(is_safe) {
        return token.to_string();
    }
    format!("'{}'", token.replace('\'', r"'\''"))
}
