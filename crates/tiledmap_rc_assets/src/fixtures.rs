//! Tiled files shared by the unit tests.

use std::fs;
use std::path::{Path, PathBuf};

pub const GRASS_TSX: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<tileset version="1.10" tiledversion="1.10.2" name="grass" tilewidth="16" tileheight="16" tilecount="4" columns="2">
 <image source="grass.png" width="32" height="32"/>
</tileset>
"#;

pub const DIRT_TSX: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<tileset version="1.10" tiledversion="1.10.2" name="dirt" tilewidth="32" tileheight="32" tilecount="2" columns="2">
 <image source="dirt.png" width="64" height="32"/>
</tileset>
"#;

/// A plain rectangle template.
pub const CHEST_TX: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<template>
 <object name="chest" type="container" width="16" height="16"/>
</template>
"#;

/// A tile template that refers to `grass.tsx` next to it.
pub const BUSH_TX: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<template>
 <tileset firstgid="1" source="grass.tsx"/>
 <object name="bush" gid="2" width="16" height="16"/>
</template>
"#;

/// Uses `grass.tsx` and `chest.tx`, plus an embedded tileset.
pub const MEADOW_TMX: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<map version="1.10" tiledversion="1.10.2" orientation="orthogonal" renderorder="right-down" width="4" height="3" tilewidth="16" tileheight="16" infinite="0" nextlayerid="3" nextobjectid="3">
 <tileset firstgid="1" source="grass.tsx"/>
 <tileset firstgid="5" name="flowers" tilewidth="8" tileheight="8" tilecount="4" columns="2">
  <image source="flowers.png" width="16" height="16"/>
 </tileset>
 <layer id="1" name="ground" width="4" height="3">
  <data encoding="csv">
1,2,1,2,
3,4,3,4,
1,2,5,6
</data>
 </layer>
 <objectgroup id="2" name="props">
  <object id="1" template="chest.tx" x="16" y="16"/>
  <object id="2" template="chest.tx" x="32" y="16"/>
 </objectgroup>
</map>
"#;

/// Uses `grass.tsx` and `dirt.tsx`.
pub const FIELD_TMX: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<map version="1.10" tiledversion="1.10.2" orientation="orthogonal" renderorder="right-down" width="2" height="2" tilewidth="16" tileheight="16" infinite="0" nextlayerid="2" nextobjectid="1">
 <tileset firstgid="1" source="grass.tsx"/>
 <tileset firstgid="5" source="dirt.tsx"/>
 <layer id="1" name="ground" width="2" height="2">
  <data encoding="csv">
1,5,
2,6
</data>
 </layer>
</map>
"#;

/// Only an embedded tileset, no external references.
pub const ISLAND_TMX: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<map version="1.10" tiledversion="1.10.2" orientation="orthogonal" renderorder="right-down" width="3" height="2" tilewidth="16" tileheight="16" infinite="0" nextlayerid="2" nextobjectid="1">
 <tileset firstgid="1" name="sand" tilewidth="16" tileheight="16" tilecount="1" columns="1">
  <image source="sand.png" width="16" height="16"/>
 </tileset>
 <layer id="1" name="ground" width="3" height="2">
  <data encoding="csv">
1,1,1,
1,1,1
</data>
 </layer>
</map>
"#;

/// Write `contents` to `dir/name`, creating parent directories.
pub fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create fixture directory");
    }
    fs::write(&path, contents).expect("write fixture");
    path
}
