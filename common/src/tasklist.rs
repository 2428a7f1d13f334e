//! Rangos de task ids: "3-5,7,10-20:2" <-> [3, 4, 5, 7, 10, 12, ...].
//!
//! `expand` acepta bloques `N`, `N-M` y `N-M:S`; `compress` solo produce
//! bloques `N` y `N-M` (nunca con paso).

use crate::error::{LaunchError, Result};

/// Un bloque ya parseado de la lista de tareas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskBlock {
    pub first: u32,
    pub last: u32,
    pub step: u32,
}

impl TaskBlock {
    /// Ids del bloque en orden. Si first > last el bloque queda vacío.
    pub fn ids(&self) -> impl Iterator<Item = u32> {
        (self.first..=self.last).step_by(self.step as usize)
    }
}

fn parse_number(text: &str, block: &str) -> Result<u32> {
    let text = text.trim();
    if text.is_empty() || !text.chars().all(|c| c.is_ascii_digit()) {
        return Err(LaunchError::InvalidRangeFormat(block.to_string()));
    }
    text.parse::<u32>()
        .map_err(|_| LaunchError::InvalidRangeFormat(block.to_string()))
}

/// Parsea un bloque `N`, `N-M` o `N-M:S`.
pub fn parse_block(block: &str) -> Result<TaskBlock> {
    let trimmed = block.trim();

    let (range, step) = match trimmed.split_once(':') {
        Some((range, step)) => {
            // el paso solo tiene sentido en un rango N-M
            if !range.contains('-') {
                return Err(LaunchError::InvalidRangeFormat(block.to_string()));
            }
            (range, parse_number(step, block)?)
        }
        None => (trimmed, 1),
    };

    if step == 0 {
        return Err(LaunchError::InvalidRangeFormat(block.to_string()));
    }

    let (first, last) = match range.split_once('-') {
        Some((first, last)) => (parse_number(first, block)?, parse_number(last, block)?),
        None => {
            let n = parse_number(range, block)?;
            (n, n)
        }
    };

    Ok(TaskBlock { first, last, step })
}

/// Divide el texto en bloques sin expandirlos.
pub fn parse_blocks(tasklist: &str) -> Result<Vec<TaskBlock>> {
    tasklist.split(',').map(parse_block).collect()
}

/// Expande un rango textual a la secuencia de ids, bloque por bloque.
pub fn expand(tasklist: &str) -> Result<Vec<u32>> {
    let blocks = parse_blocks(tasklist)?;
    Ok(blocks.iter().flat_map(|b| b.ids()).collect())
}

/// Agrupa corridas consecutivas (paso 1) en bloques `a-b`.
///
/// Precondición: `ids` ordenado ascendente y sin duplicados.
pub fn compress(ids: &[u32]) -> String {
    let mut blocks: Vec<String> = Vec::new();
    let mut iter = ids.iter().copied();

    let Some(mut first) = iter.next() else {
        return String::new();
    };
    let mut last = first;

    let mut push = |first: u32, last: u32| {
        if first == last {
            blocks.push(first.to_string());
        } else {
            blocks.push(format!("{}-{}", first, last));
        }
    };

    for id in iter {
        if last.checked_add(1) == Some(id) {
            last = id;
        } else {
            push(first, last);
            first = id;
            last = id;
        }
    }
    push(first, last);

    blocks.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compress_agrupa_corridas_consecutivas() {
        assert_eq!(compress(&[3, 4, 5, 6, 9, 10, 15]), "3-6,9-10,15");
        assert_eq!(compress(&[1]), "1");
        assert_eq!(compress(&[]), "");
        assert_eq!(compress(&[1, 3, 5]), "1,3,5");
    }

    #[test]
    fn expand_lee_bloques_simples_y_rangos() {
        assert_eq!(expand("3-6,9-10,15").unwrap(), vec![3, 4, 5, 6, 9, 10, 15]);
        assert_eq!(expand("7").unwrap(), vec![7]);
    }

    #[test]
    fn expand_respeta_el_paso() {
        assert_eq!(expand("1-10:2").unwrap(), vec![1, 3, 5, 7, 9]);
        assert_eq!(expand("18-22:1,26,34-49:3").unwrap()[..6], [18, 19, 20, 21, 22, 26]);
    }

    #[test]
    fn expand_con_inicio_mayor_que_fin_da_bloque_vacio() {
        assert_eq!(expand("5-3").unwrap(), Vec::<u32>::new());
        assert_eq!(expand("1,9-2,4").unwrap(), vec![1, 4]);
    }

    #[test]
    fn expand_rechaza_formatos_invalidos() {
        for bad in ["", "a", "1-", "-3", "1-5:0", "5:2", "1,,2", "1-2-3", "1-4:x"] {
            let err = expand(bad).unwrap_err();
            assert!(
                matches!(err, LaunchError::InvalidRangeFormat(_)),
                "esperaba InvalidRangeFormat para {bad:?}, obtuve {err:?}"
            );
        }
    }

    #[test]
    fn compress_y_expand_son_inversas_para_datos_ordenados() {
        let casos: Vec<Vec<u32>> = vec![
            vec![],
            vec![0],
            vec![1, 2, 3],
            vec![2, 4, 6, 7, 8, 100],
            (1..=50).filter(|n| n % 7 != 0).collect(),
            vec![u32::MAX - 1, u32::MAX],
        ];
        for ids in casos {
            let text = compress(&ids);
            let back = if ids.is_empty() { vec![] } else { expand(&text).unwrap() };
            assert_eq!(back, ids, "roundtrip falló para {text:?}");
        }
    }

    #[test]
    fn parse_blocks_conserva_el_orden_textual() {
        let blocks = parse_blocks("10-12,1").unwrap();
        assert_eq!(blocks[0], TaskBlock { first: 10, last: 12, step: 1 });
        assert_eq!(blocks[1], TaskBlock { first: 1, last: 1, step: 1 });
    }
}
